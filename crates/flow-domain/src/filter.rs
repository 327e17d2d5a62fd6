//! The predicate contract a flow is tested against. `flow-core::filter::parse`
//! compiles filter expression text down to a `Box<dyn Filter>`; this crate
//! only needs the trait to let `Flow::matches` stay decoupled from any one
//! grammar or implementation.

use crate::request::Request;
use crate::response::Response;

/// A compiled filter predicate, evaluated against a request and (if the flow
/// has completed) its response.
pub trait Filter: Send + Sync {
    fn evaluate(&self, request: &Request, response: Option<&Response>) -> bool;
}

/// The absent filter: matches everything.
pub struct MatchAll;

impl Filter for MatchAll {
    fn evaluate(&self, _request: &Request, _response: Option<&Response>) -> bool {
        true
    }
}
