//! Single-shot acknowledgement handles.
//!
//! The transport layer owns the real handle and lends it to the core for
//! exactly one call. We model that contract with a one-shot channel plus an
//! explicit `acked` marker so a second ack attempt is a catchable error
//! rather than a panic or a silent double-send.

use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AckError {
    #[error("artifact already acknowledged")]
    AlreadyAcked,
}

/// What the transport should do with a request it handed to the core.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// Forward the request upstream unmodified (beyond in-place edits).
    Forward,
    /// Answer the request with this canned response, without going upstream.
    Respond(crate::response::Response),
    /// Drop the connection; no response will be produced.
    Kill,
}

/// What the transport should do with a response it handed to the core.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// Deliver the (possibly modified) response to the client.
    Deliver,
    /// Drop the connection instead of delivering it.
    Kill,
}

/// What the transport should do with a connection error it handed to the core.
pub type ErrorOutcome = ResponseOutcome;

/// A single-shot acknowledgement handle.
///
/// `ack()` may be called at most once; subsequent calls return
/// `AckError::AlreadyAcked` and have no effect. Built on a `oneshot` channel
/// so the matching transport-side receiver can simply `.await` it.
#[derive(Debug)]
pub struct AckHandle<T> {
    tx: Option<oneshot::Sender<T>>,
}

impl<T> AckHandle<T> {
    /// Creates a fresh, unacknowledged handle paired with a receiver the
    /// transport layer keeps.
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A handle detached from any receiver, for tests and for synthesized
    /// flows (e.g. replayed requests) that have no live transport waiting.
    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub fn is_acked(&self) -> bool {
        self.tx.is_none()
    }

    pub fn ack(&mut self, outcome: T) -> Result<(), AckError> {
        match self.tx.take() {
            Some(tx) => {
                // The transport may already have disconnected (e.g. the
                // client hung up); that is not our error to report.
                let _ = tx.send(outcome);
                Ok(())
            }
            None => Err(AckError::AlreadyAcked),
        }
    }
}

impl<T> Default for AckHandle<T> {
    fn default() -> Self {
        Self::detached()
    }
}

impl<T> Clone for AckHandle<T> {
    /// Snapshots/clones never carry a live sender: the transport's handle is
    /// not `Clone`-able in spirit (single-shot, owned by one caller), so a
    /// clone is always already-acked from the new copy's point of view.
    fn clone(&self) -> Self {
        Self { tx: None }
    }
}

impl<T> PartialEq for AckHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.is_acked() == other.is_acked()
    }
}
impl<T> Eq for AckHandle<T> {}
