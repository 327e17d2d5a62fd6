//! Server-side response playback: a FIFO queue of recorded responses keyed
//! by request fingerprint, consumed one-for-one by matching live requests.

use std::collections::{HashMap, VecDeque};

use flow_core::fingerprint::{fingerprint, Fingerprint};
use flow_domain::{Flow, Request};

pub struct ServerPlaybackState {
    buckets: HashMap<Fingerprint, VecDeque<Flow>>,
    header_allowlist: Vec<String>,
}

impl ServerPlaybackState {
    /// Builds the fingerprint map from a list of response-bearing flows,
    /// inserting each at the tail of its bucket (so playback replays in
    /// recording order).
    pub fn new(flows: Vec<Flow>, header_allowlist: Vec<String>) -> Self {
        let mut buckets: HashMap<Fingerprint, VecDeque<Flow>> = HashMap::new();
        for flow in flows {
            if flow.response.is_none() {
                continue;
            }
            let fp = fingerprint(&flow.request, &header_allowlist);
            buckets.entry(fp).or_default().push_back(flow);
        }
        Self { buckets, header_allowlist }
    }

    /// Pops the head of the bucket matching `request`'s fingerprint.
    pub fn next_flow(&mut self, request: &Request) -> Option<Flow> {
        let fp = fingerprint(request, &self.header_allowlist);
        let bucket = self.buckets.get_mut(&fp)?;
        let flow = bucket.pop_front();
        if bucket.is_empty() {
            self.buckets.remove(&fp);
        }
        flow
    }

    pub fn count(&self) -> usize {
        self.buckets.values().map(VecDeque::len).sum()
    }

    pub fn is_drained(&self) -> bool {
        self.count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_domain::Response;

    fn flow_with_response(path: &str, status: u16) -> Flow {
        let req = Request::new("example.com", 80, "http", "GET", path);
        let mut flow = Flow::new(req.clone());
        flow.response = Some(Response::new(status, req));
        flow
    }

    #[test]
    fn replays_in_insertion_order_then_misses() {
        let mut state = ServerPlaybackState::new(vec![flow_with_response("/a", 200), flow_with_response("/a", 201)], vec![]);

        let probe = Request::new("example.com", 80, "http", "GET", "/a");
        let first = state.next_flow(&probe).unwrap();
        assert_eq!(first.response.unwrap().status_code, 200);

        let second = state.next_flow(&probe).unwrap();
        assert_eq!(second.response.unwrap().status_code, 201);

        assert!(state.next_flow(&probe).is_none());
    }

    #[test]
    fn distinct_fingerprints_use_distinct_buckets() {
        let mut state = ServerPlaybackState::new(vec![flow_with_response("/a", 200)], vec![]);
        let other = Request::new("example.com", 80, "http", "GET", "/b");
        assert!(state.next_flow(&other).is_none());
    }

    #[test]
    fn count_reflects_remaining_queued_responses() {
        let mut state = ServerPlaybackState::new(vec![flow_with_response("/a", 200), flow_with_response("/b", 200)], vec![]);
        assert_eq!(state.count(), 2);
        let probe = Request::new("example.com", 80, "http", "GET", "/a");
        state.next_flow(&probe);
        assert_eq!(state.count(), 1);
    }
}
