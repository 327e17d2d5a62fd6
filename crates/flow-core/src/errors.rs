use thiserror::Error;

/// Errors surfaced by the flow store and its filter machinery. Never fatal;
/// every variant is reported back to the caller without mutating state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid filter expression: {0}")]
    InvalidFilter(String),

    #[error("flow not found")]
    FlowNotFound,
}
