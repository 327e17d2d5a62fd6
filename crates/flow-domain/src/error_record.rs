//! A connection-level failure (DNS failure, refused connection, timeout...)
//! that stands in for a response when the origin never answered.

use uuid::Uuid;

use crate::ack::{AckError, AckHandle, ErrorOutcome};
use crate::snapshot::ErrorSnapshot;

/// A connection-level error as reported by the transport layer: a message
/// plus the id of the request it interrupted, if any. A dangling error with
/// no known request is represented by `request_id: None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub message: String,
    pub request_id: Option<Uuid>,
    ack: AckHandle<ErrorOutcome>,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), request_id: None, ack: AckHandle::detached() }
    }

    pub fn for_request(request_id: Uuid, message: impl Into<String>) -> Self {
        Self { message: message.into(), request_id: Some(request_id), ack: AckHandle::detached() }
    }

    pub fn with_ack(mut self, ack: AckHandle<ErrorOutcome>) -> Self {
        self.ack = ack;
        self
    }

    pub fn is_acked(&self) -> bool {
        self.ack.is_acked()
    }

    pub fn ack(&mut self, outcome: ErrorOutcome) -> Result<(), AckError> {
        self.ack.ack(outcome)
    }

    pub fn snapshot(&self) -> ErrorSnapshot {
        ErrorSnapshot { message: self.message.clone() }
    }

    pub fn restore(&mut self, snap: ErrorSnapshot) {
        self.message = snap.message;
    }

    pub fn from_snapshot(snap: ErrorSnapshot) -> Self {
        Self::new(snap.message)
    }
}
