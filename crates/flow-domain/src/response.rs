//! The response to an intercepted request (or the canned response played
//! back from a recording).

use chrono::{DateTime, Utc};

use crate::ack::{AckError, AckHandle, ResponseOutcome};
use crate::headers::Headers;
use crate::request::{Pattern, Request};
use crate::snapshot::ResponseSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    pub headers: Headers,
    pub content: Vec<u8>,
    pub request: Request,
    pub is_replay: bool,
    ack: AckHandle<ResponseOutcome>,
}

impl Response {
    pub fn new(status_code: u16, request: Request) -> Self {
        Self {
            status_code,
            headers: Headers::new(),
            content: Vec::new(),
            request,
            is_replay: false,
            ack: AckHandle::detached(),
        }
    }

    pub fn with_ack(mut self, ack: AckHandle<ResponseOutcome>) -> Self {
        self.ack = ack;
        self
    }

    pub fn is_acked(&self) -> bool {
        self.ack.is_acked()
    }

    pub fn ack(&mut self, outcome: ResponseOutcome) -> Result<(), AckError> {
        self.ack.ack(outcome)
    }

    pub fn snapshot(&self) -> ResponseSnapshot {
        ResponseSnapshot {
            status_code: self.status_code,
            headers: self.headers.to_pairs(),
            content: self.content.clone(),
            is_replay: self.is_replay,
        }
    }

    pub fn restore(&mut self, snap: ResponseSnapshot) {
        self.status_code = snap.status_code;
        self.headers = Headers::from_pairs(snap.headers);
        self.content = snap.content;
        self.is_replay = snap.is_replay;
    }

    pub fn from_snapshot(request: Request, snap: ResponseSnapshot) -> Self {
        let mut r = Response::new(snap.status_code, request);
        r.restore(snap);
        r
    }

    pub fn mark_replay(&mut self) {
        self.is_replay = true;
    }

    pub fn replace(&mut self, pattern: &Pattern, replacement: &[u8]) -> usize {
        let mut count = 0;
        let regex_str = regex::Regex::new(pattern.as_str()).expect("pattern valid as str regex");
        count += self.headers.replace(&regex_str, &String::from_utf8_lossy(replacement));

        let content_regex = regex::bytes::Regex::new(pattern.as_str()).expect("pattern valid as byte regex");
        let n = content_regex.find_iter(&self.content).count();
        self.content = content_regex.replace_all(&self.content, replacement).into_owned();
        count += n;
        count
    }

    /// Updates date-sensitive headers relative to now, so a canned response
    /// played back long after it was recorded doesn't look stale: `Date` is
    /// stamped to now, `Expires` is shifted by the same delta that separated
    /// it from the original `Date`, and any `Set-Cookie` `Expires` attribute
    /// is shifted the same way. `Max-Age` is already relative to delivery
    /// time and is left untouched.
    pub fn refresh(&mut self) {
        let now = Utc::now();
        let original_date = self.headers.get_first("date").and_then(parse_http_date);

        if let Some(expires) = self.headers.get_first("expires").and_then(parse_http_date) {
            let delta = expires - original_date.unwrap_or(now);
            self.headers.set("expires", format_http_date(now + delta));
        }

        if self.headers.contains("date") {
            self.headers.set("date", format_http_date(now));
        }

        let cookies: Vec<String> = self.headers.get_all("set-cookie").to_vec();
        if !cookies.is_empty() {
            let refreshed: Vec<String> =
                cookies.iter().map(|c| refresh_cookie_expires(c, original_date.unwrap_or(now), now)).collect();
            self.headers.set_all("set-cookie", refreshed);
        }
    }
}

fn format_http_date(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s).ok().map(|d| d.with_timezone(&Utc))
}

fn refresh_cookie_expires(raw: &str, reference: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let mut parts: Vec<String> = Vec::new();
    for (i, seg) in raw.split(';').enumerate() {
        if i == 0 {
            parts.push(seg.to_string());
            continue;
        }
        let trimmed = seg.trim();
        if let Some(eq) = trimmed.to_ascii_lowercase().find("expires=").filter(|p| *p == 0) {
            let _ = eq;
            let value = &trimmed["expires=".len()..];
            if let Some(parsed) = parse_http_date(value) {
                let delta = parsed - reference;
                parts.push(format!(" Expires={}", format_http_date(now + delta)));
                continue;
            }
        }
        parts.push(seg.to_string());
    }
    parts.join(";")
}
