//! The atomic unit of the store: a request plus whatever completed it.

use std::io::Write as _;
use std::process::{Command, Stdio};

use crate::ack::{RequestOutcome, ResponseOutcome};
use crate::error_record::ErrorRecord;
use crate::errors::ScriptError;
use crate::filter::Filter;
use crate::request::{Pattern, Request};
use crate::response::Response;
use crate::snapshot::FlowSnapshot;
use crate::version::IVERSION;

#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub request: Request,
    pub response: Option<Response>,
    pub error: Option<ErrorRecord>,
    pub intercepting: bool,
    backup: Option<Box<FlowSnapshot>>,
    /// What to ack the request with once interception is released, for the
    /// case where the response that will eventually be delivered carries no
    /// live transport ack of its own (e.g. a server-playback hit, delivered
    /// through the request's channel rather than a response channel).
    pending_request_outcome: Option<RequestOutcome>,
}

impl Flow {
    pub fn new(request: Request) -> Self {
        Self { request, response: None, error: None, intercepting: false, backup: None, pending_request_outcome: None }
    }

    pub fn snapshot(&self, include_backup: bool) -> FlowSnapshot {
        FlowSnapshot {
            request: Some(self.request.snapshot()),
            response: self.response.as_ref().map(Response::snapshot),
            error: self.error.as_ref().map(ErrorRecord::snapshot),
            version: IVERSION,
            backup: if include_backup { self.backup.clone() } else { None },
        }
    }

    pub fn restore(&mut self, snap: FlowSnapshot) {
        if let Some(req) = snap.request {
            self.request.restore(req);
        }
        self.response = snap.response.map(|r| Response::from_snapshot(self.request.clone(), r));
        self.error = snap.error.map(ErrorRecord::from_snapshot);
        self.backup = snap.backup;
    }

    /// Takes a backup if none is currently held. A second call before an
    /// intervening `revert` is a no-op, matching the single-level backup
    /// model (no stack).
    pub fn backup(&mut self) {
        if self.backup.is_none() {
            self.backup = Some(Box::new(self.snapshot(false)));
        }
    }

    pub fn revert(&mut self) {
        if let Some(snap) = self.backup.take() {
            self.restore(*snap);
        }
    }

    /// Conservative: true whenever a backup is held, regardless of whether
    /// the flow has actually diverged from it since.
    pub fn modified(&self) -> bool {
        self.backup.is_some()
    }

    pub fn matches(&self, filter: &dyn Filter) -> bool {
        filter.evaluate(&self.request, self.response.as_ref())
    }

    pub fn intercept(&mut self) {
        self.intercepting = true;
    }

    /// Like `intercept`, but also remembers what the request should
    /// eventually be acked with once released, needed when that ack is the
    /// only channel the delivered response will ever go out on.
    pub fn intercept_request(&mut self, outcome: RequestOutcome) {
        self.pending_request_outcome = Some(outcome);
        self.intercepting = true;
    }

    /// Acknowledges the most recent unacknowledged artifact (response if one
    /// is attached and still pending, else the request) and clears the
    /// interception flag.
    ///
    /// A response attached without a live transport ack (e.g. one
    /// synthesized by server playback, which is really delivered through the
    /// request's own ack channel) is already "acked" from construction, so
    /// this falls through to the request in that case too.
    pub fn accept_intercept(&mut self) {
        let response_pending = matches!(self.response.as_ref(), Some(r) if !r.is_acked());
        if response_pending {
            let _ = self.response.as_mut().unwrap().ack(ResponseOutcome::Deliver);
        } else if let Some(outcome) = self.pending_request_outcome.take() {
            let _ = self.request.ack(outcome);
        } else if !self.request.is_acked() {
            let _ = self.request.ack(RequestOutcome::Forward);
        }
        self.intercepting = false;
    }

    /// Attaches a "Connection killed" error, acknowledges the latest pending
    /// artifact with a null outcome, and clears interception. Returns the
    /// error record so the caller can notify its own error handler with it,
    /// since flow-domain has no FlowMaster to call back into directly.
    pub fn kill(&mut self) -> &ErrorRecord {
        let response_pending = matches!(self.response.as_ref(), Some(r) if !r.is_acked());
        if response_pending {
            let _ = self.response.as_mut().unwrap().ack(ResponseOutcome::Kill);
        } else if !self.request.is_acked() {
            let _ = self.request.ack(RequestOutcome::Kill);
        }
        self.error = Some(ErrorRecord::new("Connection killed"));
        self.intercepting = false;
        self.pending_request_outcome = None;
        self.error.as_ref().expect("just set")
    }

    /// Applies `pattern` to request, response (if any), and error message
    /// (if any). Returns the aggregate replacement count.
    pub fn replace(&mut self, pattern: &Pattern, replacement: &[u8]) -> usize {
        let mut count = self.request.replace(pattern, replacement);
        if let Some(resp) = self.response.as_mut() {
            count += resp.replace(pattern, replacement);
        }
        if let Some(err) = self.error.as_mut() {
            let regex_str = regex::Regex::new(pattern.as_str()).expect("pattern valid as str regex");
            let text = regex_str.replace_all(&err.message, String::from_utf8_lossy(replacement).as_ref());
            count += regex_str.find_iter(&err.message).count();
            err.message = text.into_owned();
        }
        count
    }

    /// Round-trips this flow's snapshot through an external script: backs
    /// the flow up, writes the JSON snapshot to the child's stdin, and
    /// restores from whatever snapshot the child writes to stdout. A nonzero
    /// exit or unparseable stdout is reported as a `ScriptError`, leaving the
    /// backup in place so the caller can `revert()`.
    pub fn run_script(&mut self, path: &str) -> Result<Vec<u8>, ScriptError> {
        self.backup();

        let input = serde_json::to_vec(&self.snapshot(true)).expect("flow snapshot always serializes");

        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ScriptError::Spawn { path: path.to_string(), source })?;

        child
            .stdin
            .take()
            .expect("piped stdin")
            .write_all(&input)
            .map_err(|source| ScriptError::Io { source })?;

        let output = child.wait_with_output().map_err(|source| ScriptError::Io { source })?;
        let code = output.status.code();

        if !output.status.success() {
            return Err(ScriptError::ExitStatus { code, errout: output.stderr });
        }

        let snap: FlowSnapshot = serde_json::from_slice(&output.stdout)
            .map_err(|_| ScriptError::InvalidResponse { code, errout: output.stderr.clone() })?;

        self.restore(snap);
        Ok(output.stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack::AckHandle;
    use crate::request::Request;
    use std::io::Write as _;
    use std::os::unix::fs::PermissionsExt;

    fn flow() -> Flow {
        Flow::new(Request::new("example.com", 80, "http", "GET", "/a"))
    }

    #[test]
    fn backup_revert_and_modified() {
        let mut f = flow();
        assert!(!f.modified());

        f.backup();
        assert!(f.modified());
        f.request.path = "/changed".to_string();

        f.revert();
        assert_eq!(f.request.path, "/a");
        assert!(!f.modified());
    }

    #[test]
    fn revert_without_backup_is_a_no_op() {
        let mut f = flow();
        f.request.path = "/edited".to_string();
        f.revert();
        assert_eq!(f.request.path, "/edited");
    }

    #[test]
    fn second_backup_before_revert_does_not_stack() {
        let mut f = flow();
        f.backup();
        f.request.path = "/first-edit".to_string();
        f.backup();
        f.request.path = "/second-edit".to_string();
        f.revert();
        assert_eq!(f.request.path, "/first-edit");
    }

    #[test]
    fn accept_intercept_forwards_a_request_stage_interception() {
        let (ack, mut rx) = AckHandle::new();
        let mut f = Flow::new(Request::new("example.com", 80, "http", "GET", "/a").with_ack(ack));

        f.intercept_request(RequestOutcome::Forward);
        assert!(f.intercepting);
        assert!(rx.try_recv().is_err(), "request must not be acked while intercepted");

        f.accept_intercept();
        assert!(!f.intercepting);
        assert_eq!(rx.try_recv().unwrap(), RequestOutcome::Forward);
    }

    #[test]
    fn kill_attaches_connection_killed_error_and_acks_the_request() {
        let (ack, mut rx) = AckHandle::new();
        let mut f = Flow::new(Request::new("example.com", 80, "http", "GET", "/a").with_ack(ack));

        f.kill();
        assert_eq!(f.error.as_ref().unwrap().message, "Connection killed");
        assert!(!f.intercepting);
        assert_eq!(rx.try_recv().unwrap(), RequestOutcome::Kill);
    }

    #[test]
    fn run_script_failure_keeps_backup_for_revert() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("boom.sh");
        {
            let mut file = std::fs::File::create(&script_path).unwrap();
            writeln!(file, "#!/bin/sh\necho -n boom 1>&2\nexit 2").unwrap();
        }
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut f = flow();
        f.request.path = "/original".to_string();
        let err = f.run_script(script_path.to_str().unwrap()).unwrap_err();

        assert_eq!(err.exit_code(), Some(2));
        assert_eq!(err.errout(), b"boom");
        assert!(f.modified());

        f.revert();
        assert_eq!(f.request.path, "/original");
    }
}
