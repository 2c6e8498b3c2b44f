//! Service options and overrides.
//!
//! `Options` is constructed once by `Service::new` and owned by the service.
//! Callers shape it with [`Override`]s, passed either to `Service::new` or to
//! `Service::init` (where they are re-applied on every call).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::components::auth::{Auth, NoopAuth};
use crate::components::broker::{Broker, MemoryBroker};
use crate::components::cmd::{Cmd, FlagCmd};
use crate::components::plugin::{PluginLoader, StaticLoader};
use crate::components::profile::Profiler;
use crate::components::registry::{MemoryRegistry, Registry};
use crate::components::runtime::{LocalRuntime, Runtime};
use crate::components::server::{Server, ServerOption};
use crate::components::store::{MemoryStore, Store};
use crate::components::Slot;
use crate::error::Result;
use crate::http::HttpServer;
use crate::lifecycle::hooks::HookChain;
use crate::observability::stats::Stats;
use crate::observability::trace::Tracer;
use crate::rpc::{Client, HttpClient};

/// Default deadline for outbound calls.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// A change applied to [`Options`].
pub type Override = Box<dyn FnOnce(&mut Options) + Send>;

pub struct Options {
    pub auth: Slot<dyn Auth>,
    pub broker: Slot<dyn Broker>,
    pub registry: Slot<dyn Registry>,
    pub runtime: Slot<dyn Runtime>,
    pub store: Slot<dyn Store>,
    pub server: Slot<dyn Server>,
    /// Outbound client; wrapped with the outbound layers by the service.
    pub client: Client,
    pub cmd: Arc<dyn Cmd>,
    pub loader: Arc<dyn PluginLoader>,
    pub profile: Option<Arc<dyn Profiler>>,
    pub tracer: Arc<Tracer>,
    pub stats: Arc<Stats>,

    /// Comma separated plugin ids; `SERVICE_PLUGIN` is read when unset.
    pub plugins: Option<String>,
    /// Honor SIGTERM/SIGINT/SIGQUIT in `run`.
    pub signal: bool,
    /// Exit the process on fatal bootstrap errors instead of returning them.
    pub exit_on_fatal: bool,
    /// External cancellation; `run` stops the service once it is cancelled.
    pub context: CancellationToken,

    pub before_start: HookChain,
    pub after_start: HookChain,
    pub before_stop: HookChain,
    pub after_stop: HookChain,
}

impl Default for Options {
    fn default() -> Self {
        let registry: Slot<dyn Registry> = Slot::new(Arc::new(MemoryRegistry::new()));

        let server = HttpServer::new();
        server.init(vec![ServerOption::Registry(registry.clone())]);

        let client = Client::new(HttpClient::new(registry.clone(), DEFAULT_CALL_TIMEOUT));

        Self {
            auth: Slot::new(Arc::new(NoopAuth::new())),
            broker: Slot::new(Arc::new(MemoryBroker::new())),
            registry,
            runtime: Slot::new(Arc::new(LocalRuntime::new())),
            store: Slot::new(Arc::new(MemoryStore::new())),
            server: Slot::new(Arc::new(server)),
            client,
            cmd: Arc::new(FlagCmd::new()),
            loader: Arc::new(StaticLoader::new()),
            profile: None,
            tracer: Arc::new(Tracer::default()),
            stats: Arc::new(Stats::new()),
            plugins: None,
            signal: true,
            exit_on_fatal: true,
            context: CancellationToken::new(),
            before_start: HookChain::new(),
            after_start: HookChain::new(),
            before_stop: HookChain::new(),
            after_stop: HookChain::new(),
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("server", &self.server.get().options().name)
            .field("plugins", &self.plugins)
            .field("signal", &self.signal)
            .field("exit_on_fatal", &self.exit_on_fatal)
            .field("before_start", &self.before_start)
            .field("after_start", &self.after_start)
            .field("before_stop", &self.before_stop)
            .field("after_stop", &self.after_stop)
            .finish_non_exhaustive()
    }
}

/// Service name.
pub fn name(name: impl Into<String>) -> Override {
    let name = name.into();
    Box::new(move |o: &mut Options| o.server.get().init(vec![ServerOption::Name(name)]))
}

pub fn version(version: impl Into<String>) -> Override {
    let version = version.into();
    Box::new(move |o: &mut Options| o.server.get().init(vec![ServerOption::Version(version)]))
}

/// Instance id; a random uuid when not set.
pub fn id(id: impl Into<String>) -> Override {
    let id = id.into();
    Box::new(move |o: &mut Options| o.server.get().init(vec![ServerOption::Id(id)]))
}

/// Listen address.
pub fn address(address: impl Into<String>) -> Override {
    let address = address.into();
    Box::new(move |o: &mut Options| o.server.get().init(vec![ServerOption::Address(address)]))
}

pub fn register_ttl(ttl: Duration) -> Override {
    Box::new(move |o: &mut Options| o.server.get().init(vec![ServerOption::RegisterTtl(ttl)]))
}

/// Whether OS termination signals stop the service.
pub fn handle_signal(enabled: bool) -> Override {
    Box::new(move |o: &mut Options| o.signal = enabled)
}

/// Cancellation token that stops `run` when cancelled.
pub fn context(token: CancellationToken) -> Override {
    Box::new(move |o: &mut Options| o.context = token)
}

pub fn exit_on_fatal(enabled: bool) -> Override {
    Box::new(move |o: &mut Options| o.exit_on_fatal = enabled)
}

/// Comma separated plugin ids, overriding `SERVICE_PLUGIN`.
pub fn plugins(list: impl Into<String>) -> Override {
    let list = list.into();
    Box::new(move |o: &mut Options| o.plugins = Some(list))
}

pub fn auth(auth: Arc<dyn Auth>) -> Override {
    Box::new(move |o: &mut Options| o.auth.set(auth))
}

pub fn broker(broker: Arc<dyn Broker>) -> Override {
    Box::new(move |o: &mut Options| o.broker.set(broker))
}

/// Registry; also handed to the server for self-registration.
pub fn registry(registry: Arc<dyn Registry>) -> Override {
    Box::new(move |o: &mut Options| o.registry.set(registry))
}

pub fn runtime(runtime: Arc<dyn Runtime>) -> Override {
    Box::new(move |o: &mut Options| o.runtime.set(runtime))
}

pub fn store(store: Arc<dyn Store>) -> Override {
    Box::new(move |o: &mut Options| o.store.set(store))
}

/// Server; it is pointed at the service registry and receives the inbound
/// layers unless it already carries handler wrappers.
pub fn server(server: Arc<dyn Server>) -> Override {
    Box::new(move |o: &mut Options| {
        server.init(vec![ServerOption::Registry(o.registry.clone())]);
        o.server.set(server);
    })
}

/// Base outbound client; the service wraps it with the outbound layers.
pub fn client(client: Client) -> Override {
    Box::new(move |o: &mut Options| o.client = client)
}

pub fn cmd(cmd: Arc<dyn Cmd>) -> Override {
    Box::new(move |o: &mut Options| o.cmd = cmd)
}

pub fn loader(loader: Arc<dyn PluginLoader>) -> Override {
    Box::new(move |o: &mut Options| o.loader = loader)
}

pub fn profile(profiler: Arc<dyn Profiler>) -> Override {
    Box::new(move |o: &mut Options| o.profile = Some(profiler))
}

pub fn tracer(tracer: Arc<Tracer>) -> Override {
    Box::new(move |o: &mut Options| o.tracer = tracer)
}

pub fn before_start<F, Fut>(hook: F) -> Override
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Box::new(move |o: &mut Options| o.before_start.push(hook))
}

pub fn after_start<F, Fut>(hook: F) -> Override
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Box::new(move |o: &mut Options| o.after_start.push(hook))
}

pub fn before_stop<F, Fut>(hook: F) -> Override
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Box::new(move |o: &mut Options| o.before_stop.push(hook))
}

pub fn after_stop<F, Fut>(hook: F) -> Override
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Box::new(move |o: &mut Options| o.after_stop.push(hook))
}
