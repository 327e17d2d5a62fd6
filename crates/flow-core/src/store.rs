//! The in-memory flow database: a keyed collection plus a filter-derived
//! view that stays consistent with the insertion-ordered full list.

use indexmap::IndexMap;
use uuid::Uuid;

use flow_domain::{Filter, Flow, Request, Response};

use crate::errors::CoreError;
use crate::filter;

/// Keyed by request id, with an insertion-ordered filtered view. The single
/// dispatcher thread is the only writer, so every method takes `&mut self`.
pub struct State {
    flows: IndexMap<Uuid, Flow>,
    view: Vec<Uuid>,
    limit: Box<dyn Filter>,
    intercept: Option<Box<dyn Filter>>,
}

impl Default for State {
    fn default() -> Self {
        Self { flows: IndexMap::new(), view: Vec::new(), limit: Box::new(flow_domain::filter::MatchAll), intercept: None }
    }
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `req` in a new flow, inserts it, and returns a handle to it.
    pub fn add_request(&mut self, req: Request) -> Uuid {
        let id = req.id;
        self.flows.insert(id, Flow::new(req));
        self.recompute_view();
        id
    }

    /// Attaches `resp` to the flow identified by its `request.id`. On a
    /// dangling response (no such flow), hands `resp` back to the caller
    /// instead of dropping it, so its ack handle can still be acknowledged
    /// explicitly rather than merely closed.
    pub fn add_response(&mut self, resp: Response) -> Result<Uuid, Response> {
        let id = resp.request.id;
        match self.flows.get_mut(&id) {
            Some(flow) => {
                flow.response = Some(resp);
                self.recompute_view();
                Ok(id)
            }
            None => Err(resp),
        }
    }

    /// Attaches an error to the flow named by `err.request_id`. On a
    /// dangling error (absent id, or one naming no known flow), hands `err`
    /// back so its ack handle can still be acknowledged explicitly.
    pub fn add_error(&mut self, err: flow_domain::ErrorRecord) -> Result<Uuid, flow_domain::ErrorRecord> {
        let Some(id) = err.request_id else { return Err(err) };
        match self.flows.get_mut(&id) {
            Some(flow) => {
                flow.error = Some(err);
                self.recompute_view();
                Ok(id)
            }
            None => Err(err),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<&Flow> {
        self.flows.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Flow> {
        self.flows.get_mut(id)
    }

    pub fn delete_flow(&mut self, id: &Uuid) {
        self.flows.shift_remove(id);
        self.view.retain(|v| v != id);
    }

    pub fn clear(&mut self) {
        self.flows.clear();
        self.view.clear();
    }

    /// Replaces the limit filter; the view is immediately recomputed, so
    /// callers see the new filter take effect atomically.
    pub fn set_limit(&mut self, text: &str) -> Result<(), CoreError> {
        let compiled = filter::parse(text).map_err(CoreError::InvalidFilter)?;
        self.limit = compiled;
        self.recompute_view();
        Ok(())
    }

    pub fn set_intercept(&mut self, text: &str) -> Result<(), CoreError> {
        let compiled = filter::parse(text).map_err(CoreError::InvalidFilter)?;
        self.intercept = Some(compiled);
        Ok(())
    }

    pub fn intercept_filter(&self) -> Option<&dyn Filter> {
        self.intercept.as_deref()
    }

    pub fn accept_all(&mut self) {
        for flow in self.flows.values_mut() {
            if flow.intercepting {
                flow.accept_intercept();
            }
        }
    }

    pub fn killall(&mut self) {
        for flow in self.flows.values_mut() {
            flow.kill();
        }
    }

    /// Bulk insert, recomputing the view once at the end rather than once
    /// per flow.
    pub fn load_flows(&mut self, flows: impl IntoIterator<Item = Flow>) {
        for flow in flows {
            let id = flow.request.id;
            self.flows.insert(id, flow);
        }
        self.recompute_view();
    }

    /// Flows with no response and no error yet: the "still in flight" count
    /// a shutdown request consults to decide whether it is safe to stop.
    pub fn active_flow_count(&self) -> usize {
        self.flows.values().filter(|f| f.response.is_none() && f.error.is_none()).count()
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    pub fn view(&self) -> impl Iterator<Item = &Flow> {
        self.view.iter().filter_map(move |id| self.flows.get(id))
    }

    fn recompute_view(&mut self) {
        self.view = self.flows.iter().filter(|(_, f)| f.matches(self.limit.as_ref())).map(|(id, _)| *id).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_domain::Request;

    fn req(host: &str, path: &str) -> Request {
        Request::new(host, 80, "http", "GET", path)
    }

    #[test]
    fn view_matches_list_filtered_by_limit() {
        let mut state = State::new();
        state.add_request(req("a.com", "/x"));
        state.add_request(req("b.com", "/y"));
        state.set_limit("~d a.com").unwrap();

        let hosts: Vec<&str> = state.view().map(|f| f.request.host.as_str()).collect();
        assert_eq!(hosts, vec!["a.com"]);
    }

    #[test]
    fn view_preserves_insertion_order() {
        let mut state = State::new();
        state.add_request(req("a.com", "/1"));
        state.add_request(req("a.com", "/2"));
        state.add_request(req("a.com", "/3"));

        let paths: Vec<&str> = state.view().map(|f| f.request.path.as_str()).collect();
        assert_eq!(paths, vec!["/1", "/2", "/3"]);
    }

    #[test]
    fn dangling_response_is_handed_back_rather_than_dropped() {
        let mut state = State::new();
        let orphan = Response::new(200, req("a.com", "/nope"));
        let returned = state.add_response(orphan.clone()).unwrap_err();
        assert_eq!(returned.content, orphan.content);
    }

    #[test]
    fn delete_removes_from_both_list_and_view() {
        let mut state = State::new();
        let id = state.add_request(req("a.com", "/x"));
        state.delete_flow(&id);
        assert_eq!(state.flow_count(), 0);
        assert_eq!(state.view().count(), 0);
    }
}
