//! Request span recording.
//!
//! # Responsibilities
//! - Assign trace and span ids to calls and handled requests
//! - Keep the most recent finished spans in a bounded buffer
//! - Serve them to the `Debug.Trace` endpoint
//!
//! Spans are also emitted as `tracing` spans by the trace middleware; this
//! buffer only keeps what the debug endpoint reports.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use uuid::Uuid;

/// Spans kept when no capacity is given.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Client,
    Server,
}

/// A finished span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    pub parent_id: Option<String>,
    pub kind: SpanKind,
    pub service: String,
    pub endpoint: String,
    /// Milliseconds since the unix epoch.
    pub started_ms: u64,
    pub duration_us: u64,
    pub error: Option<String>,
}

/// A span in flight, returned by [`Tracer::start`].
#[derive(Debug)]
pub struct ActiveSpan {
    record: SpanRecord,
    started: Instant,
}

impl ActiveSpan {
    pub fn trace_id(&self) -> &str {
        &self.record.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.record.span_id
    }
}

#[derive(Debug)]
pub struct Tracer {
    capacity: usize,
    spans: Mutex<VecDeque<SpanRecord>>,
}

impl Tracer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            spans: Mutex::new(VecDeque::new()),
        }
    }

    pub fn new_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Open a span. A missing `trace_id` starts a new trace.
    pub fn start(
        &self,
        kind: SpanKind,
        service: &str,
        endpoint: &str,
        trace_id: Option<&str>,
        parent_id: Option<&str>,
    ) -> ActiveSpan {
        let started_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        ActiveSpan {
            record: SpanRecord {
                trace_id: trace_id.map_or_else(Self::new_id, str::to_string),
                span_id: Self::new_id(),
                parent_id: parent_id.map(str::to_string),
                kind,
                service: service.to_string(),
                endpoint: endpoint.to_string(),
                started_ms,
                duration_us: 0,
                error: None,
            },
            started: Instant::now(),
        }
    }

    /// Close a span and keep it, evicting the oldest when full.
    pub fn finish(&self, span: ActiveSpan, error: Option<String>) {
        let mut record = span.record;
        record.duration_us = span.started.elapsed().as_micros() as u64;
        record.error = error;

        let mut spans = self.spans.lock().unwrap_or_else(PoisonError::into_inner);
        if spans.len() == self.capacity {
            spans.pop_front();
        }
        spans.push_back(record);
    }

    /// Finished spans, oldest first.
    pub fn read(&self) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn read_trace(&self, trace_id: &str) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.trace_id == trace_id)
            .cloned()
            .collect()
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_continues_trace() {
        let tracer = Tracer::default();
        let root = tracer.start(SpanKind::Client, "orders", "Orders.Get", None, None);
        let trace_id = root.trace_id().to_string();
        let child = tracer.start(
            SpanKind::Server,
            "orders",
            "Orders.Get",
            Some(&trace_id),
            Some(root.span_id()),
        );
        assert_eq!(child.trace_id(), trace_id);
        assert_ne!(child.span_id(), root.span_id());

        tracer.finish(child, None);
        tracer.finish(root, Some("boom".into()));

        let spans = tracer.read_trace(&trace_id);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].kind, SpanKind::Server);
        assert_eq!(spans[1].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_buffer_is_bounded() {
        let tracer = Tracer::new(2);
        for endpoint in ["A.a", "B.b", "C.c"] {
            let span = tracer.start(SpanKind::Server, "svc", endpoint, None, None);
            tracer.finish(span, None);
        }

        let endpoints: Vec<_> = tracer.read().into_iter().map(|s| s.endpoint).collect();
        assert_eq!(endpoints, vec!["B.b", "C.c"]);
    }
}
