//! HTTP transport for inbound requests.
//!
//! # Responsibilities
//! - Create Axum Router dispatching `POST /{Handler.Method}` to handlers
//! - Wrap every handler with the inbound middleware chain
//! - Wire up tower-http middleware (tracing, request timeout)
//! - Register the node in the registry, heartbeat while running, deregister on stop
//! - Graceful shutdown driven by a cancellation token

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response as HttpResponse},
    routing::post,
    Router,
};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::components::registry::{Node, ServiceRecord};
use crate::components::server::{Handler, Server, ServerOption, ServerOptions};
use crate::error::{Error, Result};
use crate::middleware::compose_inbound;
use crate::rpc::{CallError, Capability, Request};

/// Deadline for a single inbound request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Handlers by name, each already wrapped with the inbound chain.
#[derive(Clone)]
struct DispatchState {
    service: String,
    handlers: Arc<HashMap<String, Capability>>,
}

struct Running {
    shutdown: CancellationToken,
    serve: JoinHandle<std::io::Result<()>>,
    heartbeat: Option<JoinHandle<()>>,
    record: ServiceRecord,
}

/// [`Server`] over axum and a tokio TCP listener.
pub struct HttpServer {
    options: RwLock<ServerOptions>,
    handlers: DashMap<String, Handler>,
    running: Mutex<Option<Running>>,
    request_timeout: Duration,
}

impl HttpServer {
    pub fn new() -> Self {
        Self::with_request_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_request_timeout(request_timeout: Duration) -> Self {
        Self {
            options: RwLock::new(ServerOptions::default()),
            handlers: DashMap::new(),
            running: Mutex::new(None),
            request_timeout,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(&self, state: DispatchState) -> Router {
        Router::new()
            .route("/{*endpoint}", post(dispatch))
            .with_state(state)
            .layer(TimeoutLayer::new(self.request_timeout))
            .layer(TraceLayer::new_for_http())
    }

    fn dispatch_state(&self, opts: &ServerOptions) -> DispatchState {
        let handlers = self
            .handlers
            .iter()
            .map(|entry| {
                let handler = entry.value();
                (
                    handler.name().to_string(),
                    compose_inbound(handler.capability(), &opts.wrappers),
                )
            })
            .collect();

        DispatchState {
            service: opts.name.clone(),
            handlers: Arc::new(handlers),
        }
    }

    fn service_record(&self, opts: &ServerOptions) -> ServiceRecord {
        let mut endpoints: Vec<String> = self
            .handlers
            .iter()
            .filter(|entry| !entry.value().is_internal())
            .map(|entry| entry.key().clone())
            .collect();
        endpoints.sort();

        ServiceRecord {
            name: opts.name.clone(),
            version: opts.version.clone(),
            endpoints,
            nodes: vec![Node {
                id: opts.id.clone(),
                address: opts.address.clone(),
                metadata: BTreeMap::from([("server".to_string(), "http".to_string())]),
            }],
        }
    }

    async fn start_inner(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(Error::Server("server already started".into()));
        }

        let address = self.options().address;
        let listener = TcpListener::bind(&address).await?;
        let local_addr = listener.local_addr()?;
        self.init(vec![ServerOption::Address(local_addr.to_string())]);

        let opts = self.options();
        let router = self.build_router(self.dispatch_state(&opts));
        let record = self.service_record(&opts);

        if let Some(registry) = &opts.registry {
            registry.get().register(&record, opts.register_ttl)?;
        }

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let serve = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        let heartbeat = match &opts.registry {
            Some(registry) if !opts.register_ttl.is_zero() => {
                let registry = registry.clone();
                let record = record.clone();
                let ttl = opts.register_ttl;
                let stop = shutdown.clone();
                Some(tokio::spawn(async move {
                    let mut ticker = tokio::time::interval((ttl / 2).max(Duration::from_millis(10)));
                    ticker.tick().await;
                    loop {
                        tokio::select! {
                            _ = stop.cancelled() => break,
                            _ = ticker.tick() => {
                                if let Err(e) = registry.get().register(&record, ttl) {
                                    tracing::warn!(service = %record.name, error = %e, "Re-registration failed");
                                }
                            }
                        }
                    }
                }))
            }
            _ => None,
        };

        tracing::info!(
            service = %opts.name,
            id = %opts.id,
            address = %local_addr,
            "HTTP server listening"
        );

        *running = Some(Running {
            shutdown,
            serve,
            heartbeat,
            record,
        });
        Ok(())
    }

    async fn stop_inner(&self) -> Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            return Err(Error::Server("server not started".into()));
        };

        let registry = self.options().registry;
        if let Some(registry) = registry {
            if let Err(e) = registry.get().deregister(&running.record) {
                tracing::warn!(service = %running.record.name, error = %e, "Deregistration failed");
            }
        }

        running.shutdown.cancel();
        if let Some(heartbeat) = running.heartbeat {
            let _ = heartbeat.await;
        }

        match running.serve.await {
            Ok(Ok(())) => {
                tracing::info!(service = %running.record.name, "HTTP server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(e) => Err(Error::Server(format!("server task failed: {e}"))),
        }
    }
}

impl Default for HttpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Server for HttpServer {
    fn options(&self) -> ServerOptions {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn init(&self, opts: Vec<ServerOption>) {
        let mut options = self.options.write().unwrap_or_else(PoisonError::into_inner);
        for opt in opts {
            options.apply(opt);
        }
    }

    fn handle(&self, handler: Handler) -> Result<()> {
        if handler.name().is_empty() || handler.name().contains('.') {
            return Err(Error::Server(format!(
                "invalid handler name {:?}",
                handler.name()
            )));
        }
        if self
            .handlers
            .insert(handler.name().to_string(), handler)
            .is_some()
        {
            tracing::debug!("Replaced an existing handler");
        }
        Ok(())
    }

    fn start(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.start_inner())
    }

    fn stop(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.stop_inner())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// `POST /{Handler.Method}`: build a [`Request`] and run it through the
/// handler's inbound chain.
async fn dispatch(
    State(state): State<DispatchState>,
    Path(endpoint): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResponse {
    let mut request = Request::new(state.service.as_str(), endpoint, body);
    *request.headers_mut() = headers;

    let Some(handler) = state.handlers.get(request.handler()).cloned() else {
        let err = CallError::NotFound(format!("no handler for {}", request.endpoint()));
        return (err.status(), err.message()).into_response();
    };

    match handler.oneshot(request).await {
        Ok(response) => (StatusCode::OK, response.headers, response.body).into_response(),
        Err(e) => (e.status(), e.message()).into_response(),
    }
}
