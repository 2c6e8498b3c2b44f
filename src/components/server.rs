//! Transport/server contract.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tower::util::BoxCloneSyncService;
use tower::Service;
use uuid::Uuid;

use crate::components::registry::Registry;
use crate::components::Slot;
use crate::error::Result;
use crate::middleware::Middleware;
use crate::rpc::{CallError, Capability, Request, Response};

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub name: String,
    /// Instance id, unique per process.
    pub id: String,
    pub version: String,
    /// Listen address; replaced by the bound address once started.
    pub address: String,
    /// Registration lifetime; zero registers without expiry.
    pub register_ttl: Duration,
    pub registry: Option<Slot<dyn Registry>>,
    /// Inbound layers, first registered is outermost.
    pub wrappers: Vec<Middleware>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            name: "servicekit".to_string(),
            id: Uuid::new_v4().to_string(),
            version: "latest".to_string(),
            address: "127.0.0.1:0".to_string(),
            register_ttl: Duration::ZERO,
            registry: None,
            wrappers: Vec::new(),
        }
    }
}

impl ServerOptions {
    pub fn apply(&mut self, opt: ServerOption) {
        match opt {
            ServerOption::Name(name) => self.name = name,
            ServerOption::Id(id) => self.id = id,
            ServerOption::Version(version) => self.version = version,
            ServerOption::Address(address) => self.address = address,
            ServerOption::RegisterTtl(ttl) => self.register_ttl = ttl,
            ServerOption::Registry(registry) => self.registry = Some(registry),
            ServerOption::WrapHandler(layer) => self.wrappers.push(layer),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ServerOption {
    Name(String),
    Id(String),
    Version(String),
    Address(String),
    RegisterTtl(Duration),
    Registry(Slot<dyn Registry>),
    WrapHandler(Middleware),
}

/// A named request handler. Endpoints `"{name}.*"` are dispatched to it.
#[derive(Clone)]
pub struct Handler {
    name: String,
    service: Capability,
    internal: bool,
}

impl Handler {
    pub fn new<S>(name: impl Into<String>, service: S) -> Self
    where
        S: Service<Request, Response = Response, Error = CallError> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        Self {
            name: name.into(),
            service: BoxCloneSyncService::new(service),
            internal: false,
        }
    }

    /// Internal handlers are served but not advertised in the registry.
    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn capability(&self) -> Capability {
        self.service.clone()
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("internal", &self.internal)
            .finish()
    }
}

pub trait Server: Send + Sync {
    fn options(&self) -> ServerOptions;

    fn init(&self, opts: Vec<ServerOption>);

    /// Register a handler, replacing any handler of the same name.
    fn handle(&self, handler: Handler) -> Result<()>;

    /// Begin accepting traffic.
    fn start(&self) -> BoxFuture<'_, Result<()>>;

    /// Stop accepting traffic and wait for the listener to shut down.
    fn stop(&self) -> BoxFuture<'_, Result<()>>;

    fn name(&self) -> &'static str;
}
