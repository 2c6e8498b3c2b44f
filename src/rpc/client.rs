//! Outbound call capability.
//!
//! # Responsibilities
//! - Hold the composed outbound chain as a cloneable handle
//! - Provide the base transport sink (`HttpClient`) that resolves peers
//!   through the registry and forwards calls over HTTP

use std::fmt;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};

use crate::components::registry::Registry;
use crate::components::Slot;
use crate::middleware::{compose_outbound, Middleware};
use crate::observability::metrics;
use crate::rpc::{CallError, Capability, Request, Response};

/// Handle to the service's outbound call path.
///
/// Cheap to clone; every clone shares the same composed chain.
#[derive(Clone)]
pub struct Client {
    inner: Capability,
    /// Set once outbound layers have been applied.
    composed: bool,
}

impl Client {
    pub fn new<S>(service: S) -> Self
    where
        S: Service<Request, Response = Response, Error = CallError> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        Self {
            inner: BoxCloneSyncService::new(service),
            composed: false,
        }
    }

    pub fn from_capability(inner: Capability) -> Self {
        Self {
            inner,
            composed: false,
        }
    }

    pub fn capability(&self) -> Capability {
        self.inner.clone()
    }

    /// Wrap this client with outbound layers; the last layer ends up outermost.
    pub fn wrap(&self, layers: &[Middleware]) -> Self {
        Self {
            inner: compose_outbound(self.inner.clone(), layers),
            composed: true,
        }
    }

    /// Whether outbound layers have been applied to this client.
    pub fn is_composed(&self) -> bool {
        self.composed
    }

    /// Issue a call through the full outbound chain.
    pub async fn call(&self, request: Request) -> Result<Response, CallError> {
        self.inner.clone().oneshot(request).await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("composed", &self.composed)
            .finish_non_exhaustive()
    }
}

/// Base outbound sink: resolves `request.service()` in the registry and
/// POSTs the body to `http://{node}/{endpoint}`.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    registry: Slot<dyn Registry>,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(registry: Slot<dyn Registry>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            registry,
            timeout,
        }
    }

    fn resolve(&self, service: &str) -> Result<String, CallError> {
        let records = self
            .registry
            .get()
            .get_service(service)
            .map_err(|e| CallError::Transport(e.to_string()))?;

        records
            .iter()
            .flat_map(|record| record.nodes.iter())
            .map(|node| node.address.clone())
            .next()
            .ok_or_else(|| CallError::NotFound(format!("service {service} not found")))
    }
}

impl Service<Request> for HttpClient {
    type Response = Response;
    type Error = CallError;
    type Future = BoxFuture<'static, Result<Response, CallError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let client = self.clone();
        Box::pin(async move {
            let start = Instant::now();
            let address = client.resolve(request.service())?;
            let url = format!("http://{}/{}", address, request.endpoint());

            tracing::debug!(
                service = %request.service(),
                endpoint = %request.endpoint(),
                url = %url,
                "Forwarding call"
            );

            let result = client
                .http
                .post(&url)
                .timeout(client.timeout)
                .headers(request.headers().clone())
                .body(request.body().clone())
                .send()
                .await;

            let reply = match result {
                Ok(reply) => reply,
                Err(e) => {
                    let err = if e.is_timeout() {
                        CallError::Timeout
                    } else {
                        CallError::Transport(e.to_string())
                    };
                    metrics::record_call(request.service(), request.endpoint(), "error", start);
                    return Err(err);
                }
            };

            let status = reply.status();
            let headers = reply.headers().clone();
            let body = reply
                .bytes()
                .await
                .map_err(|e| CallError::Transport(e.to_string()))?;

            if !status.is_success() {
                metrics::record_call(request.service(), request.endpoint(), "error", start);
                let message = String::from_utf8_lossy(&body).into_owned();
                return Err(CallError::from_status(status, message));
            }

            metrics::record_call(request.service(), request.endpoint(), "ok", start);
            Ok(Response { headers, body })
        })
    }
}
