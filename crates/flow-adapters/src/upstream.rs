//! The transport-side contract a replay worker sends requests through. The
//! core never opens a socket itself; it depends on this trait so tests can
//! substitute a canned upstream.

use async_trait::async_trait;
use thiserror::Error;

use flow_domain::{Request, Response};

#[derive(Debug, Error)]
#[error("upstream connection failed: {0}")]
pub struct UpstreamError(pub String);

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response, UpstreamError>;
}
