//! The intercepted HTTP request.

use uuid::Uuid;

use crate::ack::{AckError, AckHandle, RequestOutcome};
use crate::client_conn::ClientConn;
use crate::headers::Headers;
use crate::snapshot::RequestSnapshot;

/// A literal-or-regex substitution pattern, applied over raw bytes so it
/// transparently covers both UTF-8 text (path, headers) and arbitrary bodies.
pub struct Pattern(regex::bytes::Regex);

impl Pattern {
    pub fn literal(s: &str) -> Self {
        Self(regex::bytes::Regex::new(&regex::escape(s)).expect("escaped literal is always valid"))
    }

    pub fn regex(s: &str) -> Result<Self, regex::Error> {
        Ok(Self(regex::bytes::Regex::new(s)?))
    }

    fn count_and_replace(&self, input: &[u8], replacement: &[u8]) -> (Vec<u8>, usize) {
        let count = self.0.find_iter(input).count();
        let replaced = self.0.replace_all(input, replacement).into_owned();
        (replaced, count)
    }

    pub(crate) fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: Uuid,
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub method: String,
    pub path: String,
    pub headers: Headers,
    pub content: Vec<u8>,
    pub client_conn: Option<ClientConn>,
    pub is_replay: bool,
    pub stickycookie: bool,
    ack: AckHandle<RequestOutcome>,
}

impl Request {
    pub fn new(host: impl Into<String>, port: u16, scheme: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            host: host.into(),
            port,
            scheme: scheme.into(),
            method: method.into(),
            path: path.into(),
            headers: Headers::new(),
            content: Vec::new(),
            client_conn: None,
            is_replay: false,
            stickycookie: false,
            ack: AckHandle::detached(),
        }
    }

    pub fn with_ack(mut self, ack: AckHandle<RequestOutcome>) -> Self {
        self.ack = ack;
        self
    }

    pub fn is_acked(&self) -> bool {
        self.ack.is_acked()
    }

    pub fn ack(&mut self, outcome: RequestOutcome) -> Result<(), AckError> {
        self.ack.ack(outcome)
    }

    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            host: self.host.clone(),
            port: self.port,
            scheme: self.scheme.clone(),
            method: self.method.clone(),
            path: self.path.clone(),
            headers: self.headers.to_pairs(),
            content: self.content.clone(),
            is_replay: self.is_replay,
            stickycookie: self.stickycookie,
        }
    }

    pub fn restore(&mut self, snap: RequestSnapshot) {
        self.host = snap.host;
        self.port = snap.port;
        self.scheme = snap.scheme;
        self.method = snap.method;
        self.path = snap.path;
        self.headers = Headers::from_pairs(snap.headers);
        self.content = snap.content;
        self.is_replay = snap.is_replay;
        self.stickycookie = snap.stickycookie;
    }

    pub fn from_snapshot(snap: RequestSnapshot) -> Self {
        let mut r = Request::new(String::new(), 0, "http", "GET", "/");
        r.restore(snap);
        r
    }

    /// Applies `pattern` across path, headers (names and values), and body.
    /// Returns the total number of replacements made.
    pub fn replace(&mut self, pattern: &Pattern, replacement: &[u8]) -> usize {
        let mut count = 0;

        let (new_path, n) = pattern.count_and_replace(self.path.as_bytes(), replacement);
        count += n;
        self.path = String::from_utf8_lossy(&new_path).into_owned();

        count += self.headers.replace(&regex_of(pattern), &String::from_utf8_lossy(replacement));

        let (new_content, n) = pattern.count_and_replace(&self.content, replacement);
        count += n;
        self.content = new_content;

        count
    }

    pub fn mark_replay(&mut self) {
        self.is_replay = true;
    }

    /// Strips conditional-request headers so a cached/replayed request is
    /// forced to hit the origin afresh.
    pub fn anticache(&mut self) {
        for name in ["if-modified-since", "if-none-match", "if-range", "if-unmodified-since", "if-match"] {
            self.headers.remove(name);
        }
    }

    /// Strips the client's compression offers so the origin returns a body we
    /// can inspect/modify without decompressing it ourselves.
    pub fn anticomp(&mut self) {
        self.headers.remove("accept-encoding");
    }

    /// Keeps `Content-Length` consistent with the current body length.
    pub fn sync_content_length(&mut self) {
        self.headers.set("content-length", self.content.len().to_string());
    }
}

// `Pattern` wraps a bytes::Regex; `Headers::replace` wants a `&str` regex, so
// we keep a parallel str-mode regex for header text. Header names/values are
// always valid UTF-8 in this model, so this round-trip is lossless.
fn regex_of(pattern: &Pattern) -> regex::Regex {
    regex::Regex::new(pattern.as_str()).expect("pattern valid as byte and str regex")
}
