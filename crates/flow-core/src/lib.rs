//! flow-core: the flow store, filter language, and server-playback fingerprint.
//!
//! `State` is the in-memory database of flows; `filter` compiles the small
//! `~d`/`~m`/`~u`/`~c`/`~a` expression language into `flow_domain::Filter`
//! predicates; `fingerprint` derives the stable digest server playback keys
//! its response queues on.

pub mod errors;
pub mod filter;
pub mod fingerprint;
pub mod store;

pub use errors::CoreError;
pub use fingerprint::{fingerprint, Fingerprint};
pub use store::State;
