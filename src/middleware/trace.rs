//! Trace propagation for outbound calls and handled requests.
//!
//! Client side: continue the trace id found on the request (header or
//! [`TraceContext`] extension) or start a new one, stamp `x-trace-id` and
//! `x-span-id`, and record a client span.
//! Handler side: continue the caller's trace, record a server span and expose
//! the span to the handler as a [`TraceContext`] extension.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::HeaderValue;
use futures_util::future::BoxFuture;
use tower::{Layer, Service};
use tracing::Instrument;

use crate::observability::trace::{SpanKind, Tracer};
use crate::rpc::{CallError, Request, Response, SPAN_ID, TRACE_ID};

/// Span of the request being handled; copy it onto outbound requests to
/// keep them in the same trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

#[derive(Debug, Clone)]
pub struct TraceLayer {
    tracer: Arc<Tracer>,
    kind: SpanKind,
}

impl TraceLayer {
    pub fn client(tracer: Arc<Tracer>) -> Self {
        Self {
            tracer,
            kind: SpanKind::Client,
        }
    }

    pub fn handler(tracer: Arc<Tracer>) -> Self {
        Self {
            tracer,
            kind: SpanKind::Server,
        }
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = Trace<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Trace {
            inner,
            tracer: Arc::clone(&self.tracer),
            kind: self.kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Trace<S> {
    inner: S,
    tracer: Arc<Tracer>,
    kind: SpanKind,
}

fn incoming_context(request: &Request) -> (Option<String>, Option<String>) {
    let trace_id = request.header(&TRACE_ID).map(str::to_string);
    let span_id = request.header(&SPAN_ID).map(str::to_string);
    if trace_id.is_some() {
        return (trace_id, span_id);
    }
    match request.extensions().get::<TraceContext>() {
        Some(ctx) => (Some(ctx.trace_id.clone()), Some(ctx.span_id.clone())),
        None => (None, None),
    }
}

impl<S> Service<Request> for Trace<S>
where
    S: Service<Request, Response = Response, Error = CallError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = CallError;
    type Future = BoxFuture<'static, Result<Response, CallError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let tracer = Arc::clone(&self.tracer);
        let kind = self.kind;

        let (trace_id, parent_id) = incoming_context(&request);
        let span = tracer.start(
            kind,
            request.service(),
            request.endpoint(),
            trace_id.as_deref(),
            parent_id.as_deref(),
        );

        match kind {
            SpanKind::Client => {
                let headers = request.headers_mut();
                if let Ok(value) = HeaderValue::from_str(span.trace_id()) {
                    headers.insert(TRACE_ID, value);
                }
                if let Ok(value) = HeaderValue::from_str(span.span_id()) {
                    headers.insert(SPAN_ID, value);
                }
            }
            SpanKind::Server => {
                request.extensions_mut().insert(TraceContext {
                    trace_id: span.trace_id().to_string(),
                    span_id: span.span_id().to_string(),
                });
            }
        }

        let log_span = match kind {
            SpanKind::Client => tracing::debug_span!(
                "call",
                service = %request.service(),
                endpoint = %request.endpoint(),
                trace_id = %span.trace_id(),
            ),
            SpanKind::Server => tracing::debug_span!(
                "handle",
                endpoint = %request.endpoint(),
                trace_id = %span.trace_id(),
            ),
        };

        Box::pin(
            async move {
                let result = inner.call(request).await;
                tracer.finish(span, result.as_ref().err().map(ToString::to_string));
                result
            }
            .instrument(log_span),
        )
    }
}
