//! The transport event queue. Everything the wire-level proxy engine
//! produces, and everything a worker posts back, funnels through this enum
//! onto the dispatcher's single queue.

use uuid::Uuid;

use flow_adapters::ReplayOutcome;
use flow_domain::{ErrorRecord, Request, Response};

pub enum TransportEvent {
    Request(Request),
    Response(Response),
    Error(ErrorRecord),
    ClientConnect { address: String },
    ClientDisconnect { address: String },
    /// A live-replay worker finished; `request_id` names the flow it was
    /// replaying for.
    ReplayFinished { request_id: Uuid, outcome: ReplayOutcome },
    Shutdown,
}
