//! Internal `Debug` handler registered by `Service::run`.
//!
//! # Endpoints
//! - `Debug.Health`: `{"status":"ok"}`, reachable without a token
//! - `Debug.Stats`: uptime, request and error counts
//! - `Debug.Trace`: recent spans, optionally filtered by `{"trace_id": ...}`

use std::sync::Arc;
use std::time::Instant;

use futures_util::future;
use serde::{Deserialize, Serialize};

use crate::components::server::Handler;
use crate::observability::stats::{Stats, StatsSnapshot};
use crate::observability::trace::{SpanRecord, Tracer};
use crate::rpc::{CallError, Request, Response};

pub const HANDLER: &str = "Debug";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReply {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReply {
    /// Seconds since `run` registered this handler.
    pub running_secs: u64,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

#[derive(Debug, Default, Deserialize)]
struct TraceQuery {
    trace_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct TraceReply {
    spans: Vec<SpanRecord>,
}

fn reply(request: &Request, started: Instant, stats: &Stats, tracer: &Tracer) -> Result<Response, CallError> {
    match request.endpoint() {
        "Debug.Health" => Response::json(&HealthReply {
            status: "ok".to_string(),
        }),
        "Debug.Stats" => Response::json(&StatsReply {
            running_secs: started.elapsed().as_secs(),
            stats: stats.snapshot(),
        }),
        "Debug.Trace" => {
            let query: TraceQuery = if request.body().is_empty() {
                TraceQuery::default()
            } else {
                serde_json::from_slice(request.body())
                    .map_err(|e| CallError::Internal(format!("invalid trace query: {e}")))?
            };
            let spans = match query.trace_id {
                Some(id) => tracer.read_trace(&id),
                None => tracer.read(),
            };
            Response::json(&TraceReply { spans })
        }
        other => Err(CallError::NotFound(format!("unknown endpoint {other}"))),
    }
}

/// The internal debug handler.
pub fn handler(started: Instant, stats: Arc<Stats>, tracer: Arc<Tracer>) -> Handler {
    let service = tower::service_fn(move |request: Request| {
        future::ready(reply(&request, started, &stats, &tracer))
    });
    Handler::new(HANDLER, service).internal(true)
}
