//! Client-side request playback: paces a queue of recorded requests through
//! the live proxy one at a time, waiting for each to complete before
//! injecting the next.
//!
//! The actual submission (`master.handle_request`) and live-replay dispatch
//! live on `FlowMaster`, since they touch the flow store and policies this
//! crate doesn't own. `ClientPlaybackState` only tracks the queue and the
//! single in-flight slot; `FlowMaster::tick` drives it.

use std::collections::VecDeque;

use uuid::Uuid;

use flow_domain::Request;

pub struct ClientPlaybackState {
    queue: VecDeque<Request>,
    current: Option<Uuid>,
}

impl ClientPlaybackState {
    pub fn new(requests: Vec<Request>) -> Self {
        Self { queue: requests.into_iter().collect(), current: None }
    }

    /// If nothing is in flight and the queue is non-empty, pops the head
    /// (clearing its client-connection back-reference, since a replayed
    /// request no longer belongs to any live client) and marks it current.
    pub fn pop_next(&mut self) -> Option<Request> {
        if self.current.is_some() {
            return None;
        }
        let mut req = self.queue.pop_front()?;
        req.client_conn = None;
        self.current = Some(req.id);
        Some(req)
    }

    /// Releases the current slot if `id` is the one holding it. Called when
    /// its response or error arrives.
    pub fn clear(&mut self, id: Uuid) {
        if self.current == Some(id) {
            self.current = None;
        }
    }

    pub fn done(&self) -> bool {
        self.queue.is_empty() && self.current.is_none()
    }

    pub fn count(&self) -> usize {
        self.queue.len() + usize::from(self.current.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(path: &str) -> Request {
        Request::new("example.com", 80, "http", "GET", path)
    }

    #[test]
    fn at_most_one_current_at_a_time() {
        let mut state = ClientPlaybackState::new(vec![req("/a"), req("/b")]);
        let first = state.pop_next().unwrap();
        assert!(state.pop_next().is_none());

        state.clear(first.id);
        let second = state.pop_next().unwrap();
        assert_eq!(second.path, "/b");
    }

    #[test]
    fn done_iff_queue_empty_and_no_current() {
        let mut state = ClientPlaybackState::new(vec![req("/a")]);
        assert!(!state.done());
        let flow = state.pop_next().unwrap();
        assert!(!state.done());
        state.clear(flow.id);
        assert!(state.done());
    }

    #[test]
    fn popped_request_loses_its_client_connection_back_reference() {
        let mut with_conn = req("/a");
        with_conn.client_conn = Some(flow_domain::ClientConn::new("10.0.0.1:1234"));
        let mut state = ClientPlaybackState::new(vec![with_conn]);
        assert!(state.pop_next().unwrap().client_conn.is_none());
    }
}
