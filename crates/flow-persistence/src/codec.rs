//! The flow log: an append-only stream of `<decimal-length>:<json>,` frames.
//! No index; a reader must walk the whole stream from the start.

use std::io::{BufReader, Read, Write};

use flow_domain::{Flow, Request};

use crate::error::PersistenceError;

pub struct FlowWriter<W: Write> {
    sink: W,
}

impl<W: Write> FlowWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    /// Appends one frame for `flow`'s snapshot (backup included, so a
    /// reloaded flow can still be reverted).
    pub fn add(&mut self, flow: &Flow) -> Result<(), PersistenceError> {
        let body = serde_json::to_vec(&flow.snapshot(true)).expect("flow snapshot always serializes");
        write!(self.sink, "{}:", body.len())?;
        self.sink.write_all(&body)?;
        self.sink.write_all(b",")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), PersistenceError> {
        self.sink.flush()?;
        Ok(())
    }
}

pub struct FlowReader<R: Read> {
    source: BufReader<R>,
    hit_eof: bool,
}

impl<R: Read> FlowReader<R> {
    pub fn new(source: R) -> Self {
        Self { source: BufReader::new(source), hit_eof: false }
    }

    fn read_byte(&mut self) -> Result<Option<u8>, PersistenceError> {
        let mut buf = [0u8; 1];
        match self.source.read(&mut buf)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }

    fn read_frame(&mut self) -> Result<Option<Flow>, PersistenceError> {
        let mut length_digits = Vec::new();
        loop {
            match self.read_byte()? {
                None if length_digits.is_empty() => return Ok(None),
                None => return Err(PersistenceError::InvalidFormat),
                Some(b':') => break,
                Some(b) if b.is_ascii_digit() => length_digits.push(b),
                Some(_) => return Err(PersistenceError::InvalidFormat),
            }
        }

        let length: usize = std::str::from_utf8(&length_digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(PersistenceError::InvalidFormat)?;

        let mut body = vec![0u8; length];
        self.source.read_exact(&mut body).map_err(|_| PersistenceError::InvalidFormat)?;

        match self.read_byte()? {
            Some(b',') => {}
            _ => return Err(PersistenceError::InvalidFormat),
        }

        let snap = serde_json::from_slice(&body).map_err(|_| PersistenceError::InvalidFormat)?;
        flow_from_snapshot(snap).ok_or(PersistenceError::InvalidFormat).map(Some)
    }
}

impl<R: Read> Iterator for FlowReader<R> {
    type Item = Result<Flow, PersistenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.hit_eof {
            return None;
        }
        match self.read_frame() {
            Ok(Some(flow)) => Some(Ok(flow)),
            Ok(None) => {
                self.hit_eof = true;
                None
            }
            Err(e) => {
                log::warn!("malformed flow log frame, stopping read: {e}");
                self.hit_eof = true;
                Some(Err(e))
            }
        }
    }
}

fn flow_from_snapshot(snap: flow_domain::snapshot::FlowSnapshot) -> Option<Flow> {
    let req_snap = snap.request.clone()?;
    let mut flow = Flow::new(Request::from_snapshot(req_snap));
    flow.restore(snap);
    Some(flow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_domain::Response;

    fn sample_flow(path: &str) -> Flow {
        let req = Request::new("example.com", 80, "http", "GET", path);
        let mut flow = Flow::new(req.clone());
        let mut resp = Response::new(200, req);
        resp.content = b"hi".to_vec();
        flow.response = Some(resp);
        flow
    }

    #[test]
    fn round_trip_preserves_snapshot() {
        let mut buf = Vec::new();
        {
            let mut writer = FlowWriter::new(&mut buf);
            writer.add(&sample_flow("/a")).unwrap();
            writer.add(&sample_flow("/b")).unwrap();
        }

        let reader = FlowReader::new(buf.as_slice());
        let flows: Result<Vec<Flow>, _> = reader.collect();
        let flows = flows.unwrap();

        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].snapshot(false), sample_flow("/a").snapshot(false));
        assert_eq!(flows[1].snapshot(false), sample_flow("/b").snapshot(false));
    }

    #[test]
    fn truncated_frame_is_invalid_format() {
        let reader = FlowReader::new(b"10:{\"a\":1}".as_slice());
        let result: Vec<_> = reader.collect();
        assert!(matches!(result.last(), Some(Err(PersistenceError::InvalidFormat))));
    }

    #[test]
    fn empty_stream_yields_no_flows() {
        let reader = FlowReader::new(b"".as_slice());
        let flows: Vec<_> = reader.collect();
        assert!(flows.is_empty());
    }
}
