//! The live-replay worker: opens a fresh upstream connection for a request
//! already marked as replay, and reports what came back. Runs off the
//! dispatcher thread; its only contact with shared state is the outcome it
//! returns, which the caller posts onto the dispatcher's event queue.

use std::sync::Arc;

use flow_domain::{ErrorRecord, Request, Response};

use crate::upstream::Upstream;

pub enum ReplayOutcome {
    Responded(Response),
    Failed(ErrorRecord),
}

pub async fn replay_request(upstream: Arc<dyn Upstream>, request: Request) -> ReplayOutcome {
    let request_id = request.id;
    match upstream.send(&request).await {
        Ok(mut response) => {
            response.mark_replay();
            ReplayOutcome::Responded(response)
        }
        Err(e) => {
            log::warn!("replay of request {request_id} failed: {e}");
            ReplayOutcome::Failed(ErrorRecord::for_request(request_id, e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoUpstream;

    #[async_trait]
    impl Upstream for EchoUpstream {
        async fn send(&self, request: &Request) -> Result<Response, crate::upstream::UpstreamError> {
            Ok(Response::new(200, request.clone()))
        }
    }

    struct FailingUpstream;

    #[async_trait]
    impl Upstream for FailingUpstream {
        async fn send(&self, _request: &Request) -> Result<Response, crate::upstream::UpstreamError> {
            Err(crate::upstream::UpstreamError("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn successful_replay_marks_response_as_replay() {
        let req = Request::new("example.com", 80, "http", "GET", "/x");
        match replay_request(Arc::new(EchoUpstream), req).await {
            ReplayOutcome::Responded(resp) => assert!(resp.is_replay),
            ReplayOutcome::Failed(_) => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn failed_replay_yields_error_record_for_the_request() {
        let req = Request::new("example.com", 80, "http", "GET", "/x");
        let id = req.id;
        match replay_request(Arc::new(FailingUpstream), req).await {
            ReplayOutcome::Failed(err) => assert_eq!(err.request_id, Some(id)),
            ReplayOutcome::Responded(_) => panic!("expected a failure"),
        }
    }
}
