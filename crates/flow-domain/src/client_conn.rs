//! Client connection metadata, back-referenced from a `Request`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConn {
    pub address: String,
    pub requestcount: u32,
    pub connection_error: Option<String>,
}

impl ClientConn {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into(), requestcount: 0, connection_error: None }
    }
}
