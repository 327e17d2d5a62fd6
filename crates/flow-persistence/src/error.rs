use thiserror::Error;

/// Errors from the flow log codec. Framing and JSON failures are collapsed
/// into a single diagnostic; the format carries no way to distinguish a
/// truncated frame from a corrupted one.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Invalid data format.")]
    InvalidFormat,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
