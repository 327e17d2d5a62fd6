//! Sticky-cookie session continuation: remembers cookies set by the origin
//! and re-attaches them to later matching requests, the way a real browser
//! would but scoped by an operator-supplied filter rather than same-origin
//! policy.

use std::collections::HashMap;

use flow_domain::{Filter, Flow};

use crate::domain_match::domain_match;

type JarKey = (String, u16, String);

pub struct StickyCookieState {
    filter: Box<dyn Filter>,
    jar: HashMap<JarKey, (String, String)>,
}

impl StickyCookieState {
    pub fn new(filter: Box<dyn Filter>) -> Self {
        Self { filter, jar: HashMap::new() }
    }

    /// Harvests any `Set-Cookie` headers on the flow's response into the jar.
    /// Cookies whose `Domain` attribute fails to domain-match the response's
    /// originating host are dropped rather than stored.
    pub fn on_response(&mut self, flow: &Flow) {
        let Some(response) = flow.response.as_ref() else { return };
        let host = flow.request.host.clone();
        let port = flow.request.port;

        for raw in response.headers.get_all("set-cookie") {
            // mitmproxy's observed behavior: a Set-Cookie value that encodes
            // more than one cookie only ever yields the first attribute
            // block. `cookie::Cookie::parse` already stops at the first
            // cookie, so no extra truncation is needed here.
            let parsed = match cookie::Cookie::parse(raw.clone()) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("sticky cookie: failed to parse Set-Cookie {raw:?}: {e}");
                    continue;
                }
            };

            let domain = parsed.domain().unwrap_or(&host).to_string();
            let path = parsed.path().unwrap_or("/").to_string();

            if !domain_match(&host, &domain) {
                continue;
            }

            let key = (domain, port, path);
            self.jar.insert(key, (parsed.name().to_string(), parsed.value().to_string()));
        }
    }

    /// Re-attaches any jar entry whose key domain-matches, ports, and
    /// path-prefixes the request, provided the flow matches the policy
    /// filter. Marks `request.stickycookie` when anything was attached.
    pub fn on_request(&self, flow: &mut Flow) {
        if !flow.matches(self.filter.as_ref()) {
            return;
        }

        let host = flow.request.host.clone();
        let port = flow.request.port;
        let path = flow.request.path.clone();

        let mut attached = false;
        for ((domain, jar_port, jar_path), (name, value)) in &self.jar {
            if *jar_port == port && domain_match(domain, &host) && path.starts_with(jar_path.as_str()) {
                append_cookie(&mut flow.request.headers, name, value);
                attached = true;
            }
        }

        if attached {
            flow.request.stickycookie = true;
        }
    }
}

fn append_cookie(headers: &mut flow_domain::Headers, name: &str, value: &str) {
    let pair = format!("{name}={value}");
    match headers.get_first("cookie") {
        Some(existing) => {
            let combined = format!("{existing}; {pair}");
            headers.set("cookie", combined);
        }
        None => headers.set("cookie", pair),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_domain::filter::MatchAll;
    use flow_domain::{Request, Response};

    fn flow_with_set_cookie(host: &str, set_cookie: &str) -> Flow {
        let req = Request::new(host, 80, "http", "GET", "/");
        let mut resp = Response::new(200, req.clone());
        resp.headers.append("set-cookie", set_cookie);
        let mut flow = Flow::new(req);
        flow.response = Some(resp);
        flow
    }

    #[test]
    fn response_hook_stores_cookie_scoped_to_domain_attribute() {
        let mut state = StickyCookieState::new(Box::new(MatchAll));
        let flow = flow_with_set_cookie("example.com", "sid=1; Domain=.example.com; Path=/");
        state.on_response(&flow);

        let mut req_flow = Flow::new(Request::new("foo.example.com", 80, "http", "GET", "/x"));
        state.on_request(&mut req_flow);

        assert_eq!(req_flow.request.headers.get_first("cookie"), Some("sid=1"));
        assert!(req_flow.request.stickycookie);
    }

    #[test]
    fn cookie_dropped_when_domain_does_not_match_response_host() {
        let mut state = StickyCookieState::new(Box::new(MatchAll));
        let flow = flow_with_set_cookie("example.com", "sid=1; Domain=.evil.com; Path=/");
        state.on_response(&flow);

        assert!(state.jar.is_empty());
    }
}
