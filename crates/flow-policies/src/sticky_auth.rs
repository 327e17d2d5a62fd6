//! Sticky-authorization: remembers the last `Authorization` header seen for
//! a host and replays it onto later filter-matching requests that lack one
//! (useful for replaying a recorded session against a live session-scoped
//! credential).

use std::collections::HashMap;

use flow_domain::{Filter, Flow};

pub struct StickyAuthState {
    filter: Box<dyn Filter>,
    memory: HashMap<String, String>,
}

impl StickyAuthState {
    pub fn new(filter: Box<dyn Filter>) -> Self {
        Self { filter, memory: HashMap::new() }
    }

    pub fn on_request(&mut self, flow: &mut Flow) {
        let host = flow.request.host.clone();

        if let Some(auth) = flow.request.headers.get_first("authorization") {
            self.memory.insert(host, auth.to_string());
            return;
        }

        if flow.matches(self.filter.as_ref()) {
            if let Some(auth) = self.memory.get(&host) {
                flow.request.headers.set("authorization", auth.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_domain::filter::MatchAll;
    use flow_domain::Request;

    #[test]
    fn replays_last_seen_authorization_for_host() {
        let mut state = StickyAuthState::new(Box::new(MatchAll));

        let mut authed = Flow::new(Request::new("example.com", 80, "http", "GET", "/"));
        authed.request.headers.set("authorization", "Bearer abc");
        state.on_request(&mut authed);

        let mut bare = Flow::new(Request::new("example.com", 80, "http", "GET", "/other"));
        state.on_request(&mut bare);

        assert_eq!(bare.request.headers.get_first("authorization"), Some("Bearer abc"));
    }

    #[test]
    fn does_not_overwrite_an_existing_authorization_header() {
        let mut state = StickyAuthState::new(Box::new(MatchAll));
        let mut authed = Flow::new(Request::new("example.com", 80, "http", "GET", "/"));
        authed.request.headers.set("authorization", "Bearer abc");
        state.on_request(&mut authed);

        let mut other = Flow::new(Request::new("example.com", 80, "http", "GET", "/x"));
        other.request.headers.set("authorization", "Bearer xyz");
        state.on_request(&mut other);

        assert_eq!(other.request.headers.get_first("authorization"), Some("Bearer xyz"));
        assert_eq!(state.memory.get("example.com"), Some(&"Bearer xyz".to_string()));
    }
}
