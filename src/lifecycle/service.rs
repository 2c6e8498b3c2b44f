//! The service lifecycle: `init`, `start`, `run`, `stop`.

use std::future::Future;
use std::io;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::components::auth::{Account, AuthOption};
use crate::components::plugin::{parse_list, PLUGIN_ENV};
use crate::components::profile::Profiler;
use crate::components::registry::RegistryOption;
use crate::components::runtime::RuntimeOption;
use crate::components::server::{Server, ServerOption};
use crate::components::store::StoreOption;
use crate::debug;
use crate::error::{Error, Result};
use crate::identity::register_account;
use crate::middleware::composer::Composer;
use crate::options::{Options, Override};
use crate::rpc::Client;

use super::gate::InitGate;
use super::shutdown::{ShutdownTrigger, Trigger};
use super::state::{LifecycleState, StateCell};

/// A service process: collaborators, hooks and lifecycle state.
pub struct Service {
    opts: RwLock<Options>,
    gate: InitGate,
    state: StateCell,
    account: OnceLock<Account>,
    composer: Composer,
}

impl Service {
    /// Build a service from defaults plus `overrides`, and wire the
    /// outbound and inbound middleware chains.
    pub fn new(overrides: Vec<Override>) -> Self {
        let mut opts = Options::default();
        for apply in overrides {
            apply(&mut opts);
        }

        let composer = Composer::new(
            opts.server.get().options().name,
            opts.auth.clone(),
            Arc::clone(&opts.tracer),
            Arc::clone(&opts.stats),
        );
        wire_chains(&mut opts, &composer);

        Self {
            opts: RwLock::new(opts),
            gate: InitGate::new(),
            state: StateCell::new(),
            account: OnceLock::new(),
            composer,
        }
    }

    pub fn name(&self) -> String {
        self.options().server.get().options().name
    }

    /// Read access to the live options.
    ///
    /// Do not hold the guard across an `.await`.
    pub fn options(&self) -> RwLockReadGuard<'_, Options> {
        self.opts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn options_mut(&self) -> RwLockWriteGuard<'_, Options> {
        self.opts.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Outbound client wrapped with the from-service, trace and auth layers.
    pub fn client(&self) -> Client {
        self.options().client.clone()
    }

    pub fn server(&self) -> Arc<dyn Server> {
        self.options().server.get()
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    /// The self-identity minted by `run`.
    pub fn account(&self) -> Option<&Account> {
        self.account.get()
    }

    /// Apply `overrides`, then run the one-time initialization sequence.
    ///
    /// Overrides are applied on every call. The sequence runs once per
    /// service; concurrent callers wait for it, later callers see its outcome.
    /// Fatal errors exit the process unless `exit_on_fatal` is disabled.
    pub fn init(&self, overrides: Vec<Override>) -> Result<()> {
        {
            let mut opts = self.options_mut();
            for apply in overrides {
                apply(&mut opts);
            }
            wire_chains(&mut opts, &self.composer);
        }

        let result = self.gate.run(|| {
            self.state.set(LifecycleState::Initializing);
            let result = self.init_once();
            self.state.set(if result.is_ok() {
                LifecycleState::Initialized
            } else {
                LifecycleState::Uninitialized
            });
            result
        });

        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::error!(error = %e, "Fatal initialization error");
                if self.options().exit_on_fatal {
                    std::process::exit(1);
                }
            }
        }
        result
    }

    fn init_once(&self) -> Result<()> {
        let mut opts = self.options_mut();

        let plugins = opts
            .plugins
            .clone()
            .or_else(|| std::env::var(PLUGIN_ENV).ok())
            .unwrap_or_default();
        for id in parse_list(&plugins) {
            let plugin = opts.loader.load(&id)?;
            opts.loader.init(&plugin)?;
            tracing::info!(plugin = %id, "Plugin loaded");
        }

        let cmd = Arc::clone(&opts.cmd);
        if cmd.app().name.is_empty() {
            cmd.set_app_name(&opts.server.get().options().name);
        }
        cmd.init(&mut opts)?;
        wire_chains(&mut opts, &self.composer);

        let app = cmd.app().name;
        let store = opts.store.get();
        store.init(vec![StoreOption::Table(app.clone())])?;

        let client = opts.client.clone();
        opts.auth
            .get()
            .init(vec![AuthOption::WithClient(client.clone())])?;
        opts.registry
            .get()
            .init(vec![RegistryOption::WithClient(client.clone())])?;
        opts.runtime
            .get()
            .init(vec![RuntimeOption::WithClient(client.clone())])?;
        store.init(vec![StoreOption::WithClient(client)])?;

        tracing::info!(app = %app, "Service initialized");
        Ok(())
    }

    /// BeforeStart hooks (fail fast), server start, AfterStart hooks (fail fast).
    ///
    /// A BeforeStart or server failure restores the previous state. An
    /// AfterStart failure is returned with the service left running; the
    /// caller is expected to `stop` it.
    pub async fn start(&self) -> Result<()> {
        let current = self.state.get();
        if !current.can_start() {
            return Err(Error::InvalidState {
                action: "start",
                state: current,
            });
        }
        self.state
            .transition("start", current, LifecycleState::Starting)?;
        self.start_claimed(current).await
    }

    /// The start sequence for a caller that already moved the state to
    /// `Starting`; failures before the server is up restore `previous`.
    async fn start_claimed(&self, previous: LifecycleState) -> Result<()> {
        let (before, after, server) = {
            let opts = self.options();
            (
                opts.before_start.clone(),
                opts.after_start.clone(),
                opts.server.get(),
            )
        };

        if let Err(e) = before.run_fail_fast("before_start").await {
            self.state.set(previous);
            return Err(e);
        }

        if let Err(e) = server.start().await {
            tracing::error!(error = %e, "Server failed to start");
            self.state.set(previous);
            return Err(e);
        }
        self.state.set(LifecycleState::Running);

        after.run_fail_fast("after_start").await
    }

    /// BeforeStop hooks (best effort), server stop, AfterStop hooks (best effort).
    ///
    /// A server stop failure is returned at once and AfterStop is skipped;
    /// otherwise the last hook error is returned. The state always ends
    /// `Stopped`.
    pub async fn stop(&self) -> Result<()> {
        self.state
            .transition("stop", LifecycleState::Running, LifecycleState::Stopping)?;

        let (before, after, server) = {
            let opts = self.options();
            (
                opts.before_stop.clone(),
                opts.after_stop.clone(),
                opts.server.get(),
            )
        };

        let mut last = before.run_best_effort("before_stop").await.err();

        if let Err(e) = server.stop().await {
            tracing::error!(error = %e, "Server failed to stop");
            self.state.set(LifecycleState::Stopped);
            return Err(e);
        }

        if let Err(e) = after.run_best_effort("after_stop").await {
            last = Some(e);
        }

        self.state.set(LifecycleState::Stopped);
        last.map_or(Ok(()), Err)
    }

    /// Serve until a termination signal or the context token fires, then stop.
    pub async fn run(&self) -> Result<()> {
        self.run_inner(ShutdownTrigger::arm)
            .await
    }

    /// Like [`run`](Self::run), with `signal` standing in for OS signals.
    pub async fn run_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = &'static str> + Send + 'static,
    {
        self.run_inner(move |_, token| Ok(ShutdownTrigger::from_future(signal, token)))
            .await
    }

    async fn run_inner<A>(&self, arm: A) -> Result<()>
    where
        A: FnOnce(bool, CancellationToken) -> io::Result<ShutdownTrigger>,
    {
        // Claim the run so a concurrent caller cannot mint a second identity.
        self.state
            .transition("run", LifecycleState::Initialized, LifecycleState::Starting)?;

        let (server, auth, profile, listen, token, stats, tracer) = {
            let opts = self.options();
            (
                opts.server.get(),
                opts.auth.get(),
                opts.profile.clone(),
                opts.signal,
                opts.context.clone(),
                Arc::clone(&opts.stats),
                Arc::clone(&opts.tracer),
            )
        };

        let prepared = server
            .handle(debug::handler(Instant::now(), stats, tracer))
            .and_then(|()| profile.map(ProfilerGuard::start).transpose());
        let _profiler = match prepared {
            Ok(guard) => guard,
            Err(e) => {
                self.state.set(LifecycleState::Initialized);
                return Err(e);
            }
        };

        tracing::info!("Starting [service] {}", server.options().name);

        let account = match register_account(server.as_ref(), auth.as_ref()) {
            Ok(account) => account,
            Err(e) => {
                self.state.set(LifecycleState::Initialized);
                return Err(e);
            }
        };
        if self.account.set(account).is_err() {
            tracing::warn!("Service account already minted, keeping the first");
        }

        self.start_claimed(LifecycleState::Initialized).await?;

        let trigger = match arm(listen, token) {
            Ok(trigger) => trigger,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                if let Err(stop_err) = self.stop().await {
                    tracing::warn!(error = %stop_err, "Stop after signal setup failure");
                }
                return Err(Error::Io(e));
            }
        };

        match trigger.wait().await {
            Trigger::Signal(name) => tracing::info!(signal = name, "Stopping [service]"),
            Trigger::Cancelled => tracing::info!("Stopping [service] on context cancellation"),
        }

        self.stop().await
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("state", &self.state.get())
            .field("initialized", &self.gate.is_done())
            .finish_non_exhaustive()
    }
}

/// Apply the outbound layers to a client that lacks them and the inbound
/// layers to a server without handler wrappers. Covers collaborators
/// replaced through overrides or flags after construction.
fn wire_chains(opts: &mut Options, composer: &Composer) {
    if !opts.client.is_composed() {
        opts.client = opts.client.wrap(&composer.outbound());
    }

    let server = opts.server.get();
    if server.options().wrappers.is_empty() {
        server.init(
            composer
                .inbound()
                .into_iter()
                .map(ServerOption::WrapHandler)
                .collect(),
        );
    }
}

/// Stops the profiler when `run` returns.
struct ProfilerGuard(Arc<dyn Profiler>);

impl ProfilerGuard {
    fn start(profiler: Arc<dyn Profiler>) -> Result<Self> {
        profiler.start()?;
        tracing::info!(profiler = profiler.name(), "Profiler started");
        Ok(Self(profiler))
    }
}

impl Drop for ProfilerGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.stop() {
            tracing::warn!(profiler = self.0.name(), error = %e, "Profiler failed to stop");
        }
    }
}
