//! Shared test doubles for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures_util::future::BoxFuture;

use servicekit::components::auth::{
    Account, Auth, AuthOption, AuthOptions, GenerateOptions, MemoryAuth, Token, TokenOptions,
};
use servicekit::components::cmd::{App, Cmd, FlagCmd};
use servicekit::components::plugin::Plugin;
use servicekit::components::profile::Profiler;
use servicekit::components::server::{Handler, Server, ServerOption, ServerOptions};
use servicekit::lifecycle::LifecycleState;
use servicekit::{options, Error, Options, Override, Result, Service};

/// Ordered record of side effects observed by the doubles.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == event)
    }
}

/// A hook that logs `name` and fails when `fail` is set.
pub fn hook(
    log: &EventLog,
    name: &'static str,
    fail: bool,
) -> impl Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static {
    let log = log.clone();
    move || {
        let log = log.clone();
        Box::pin(async move {
            log.push(name);
            if fail {
                Err(Error::hook(name))
            } else {
                Ok(())
            }
        })
    }
}

/// Server double that records start/stop and never binds a socket.
pub struct RecordingServer {
    log: EventLog,
    options: RwLock<ServerOptions>,
    handlers: Mutex<Vec<String>>,
    fail_start: bool,
    fail_stop: bool,
}

impl RecordingServer {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            options: RwLock::new(ServerOptions::default()),
            handlers: Mutex::new(Vec::new()),
            fail_start: false,
            fail_stop: false,
        }
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn handlers(&self) -> Vec<String> {
        self.handlers.lock().unwrap().clone()
    }
}

impl Server for RecordingServer {
    fn options(&self) -> ServerOptions {
        self.options.read().unwrap().clone()
    }

    fn init(&self, opts: Vec<ServerOption>) {
        let mut options = self.options.write().unwrap();
        for opt in opts {
            options.apply(opt);
        }
    }

    fn handle(&self, handler: Handler) -> Result<()> {
        self.handlers.lock().unwrap().push(handler.name().to_string());
        Ok(())
    }

    fn start(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.log.push("server.start");
            if self.fail_start {
                Err(Error::Server("start refused".into()))
            } else {
                Ok(())
            }
        })
    }

    fn stop(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.log.push("server.stop");
            if self.fail_stop {
                Err(Error::Server("stop refused".into()))
            } else {
                Ok(())
            }
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Auth double over [`MemoryAuth`] that records generate/token/init calls.
pub struct RecordingAuth {
    log: EventLog,
    inner: MemoryAuth,
    fail_generate: bool,
    generate_delay: Duration,
}

impl RecordingAuth {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            inner: MemoryAuth::new(),
            fail_generate: false,
            generate_delay: Duration::ZERO,
        }
    }

    pub fn failing_generate(mut self) -> Self {
        self.fail_generate = true;
        self
    }

    /// Block the calling thread in `generate` for `delay`.
    pub fn slow_generate(mut self, delay: Duration) -> Self {
        self.generate_delay = delay;
        self
    }
}

impl Auth for RecordingAuth {
    fn init(&self, opts: Vec<AuthOption>) -> Result<()> {
        for opt in &opts {
            match opt {
                AuthOption::ClientToken(_) => self.log.push("auth.install_token"),
                AuthOption::WithClient(_) => self.log.push("auth.with_client"),
                _ => {}
            }
        }
        self.inner.init(opts)
    }

    fn options(&self) -> AuthOptions {
        self.inner.options()
    }

    fn generate(&self, id: &str, opts: GenerateOptions) -> Result<Account> {
        self.log.push("auth.generate");
        std::thread::sleep(self.generate_delay);
        if self.fail_generate {
            return Err(Error::Auth("generate refused".into()));
        }
        self.inner.generate(id, opts)
    }

    fn inspect(&self, access_token: &str) -> Result<Account> {
        self.inner.inspect(access_token)
    }

    fn token(&self, opts: TokenOptions) -> Result<Token> {
        self.log.push("auth.token");
        self.inner.token(opts)
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Flag parser double counting `init` calls.
#[derive(Default)]
pub struct CountingCmd {
    app: Mutex<App>,
    pub inits: AtomicUsize,
    fail: bool,
}

impl CountingCmd {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

impl Cmd for CountingCmd {
    fn app(&self) -> App {
        self.app.lock().unwrap().clone()
    }

    fn set_app_name(&self, name: &str) {
        self.app.lock().unwrap().name = name.to_string();
    }

    fn init(&self, _opts: &mut Options) -> Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        if self.fail {
            Err(Error::Flags("unknown flag --bogus".into()))
        } else {
            Ok(())
        }
    }
}

/// Plugin counting its `init` calls.
pub struct CountingPlugin {
    name: &'static str,
    pub inits: AtomicUsize,
}

impl CountingPlugin {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inits: AtomicUsize::new(0),
        }
    }
}

impl Plugin for CountingPlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn init(&self) -> Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Profiler double that records start/stop.
pub struct RecordingProfiler {
    log: EventLog,
}

impl RecordingProfiler {
    pub fn new(log: &EventLog) -> Self {
        Self { log: log.clone() }
    }
}

impl Profiler for RecordingProfiler {
    fn start(&self) -> Result<()> {
        self.log.push("profiler.start");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.log.push("profiler.stop");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Overrides every test service needs: no OS signals, no process exit,
/// no parsing of the test harness's own arguments, an ephemeral port.
pub fn test_overrides() -> Vec<Override> {
    vec![
        options::cmd(Arc::new(FlagCmd::from_args(["svc"]))),
        options::handle_signal(false),
        options::exit_on_fatal(false),
        options::address("127.0.0.1:0"),
    ]
}

/// A service over the recording doubles, already initialized.
pub fn recording_service(log: &EventLog, extra: Vec<Override>) -> Service {
    recording_service_with(log, RecordingServer::new(log), extra)
}

pub fn recording_service_with(
    log: &EventLog,
    server: impl Into<Arc<RecordingServer>>,
    extra: Vec<Override>,
) -> Service {
    let server: Arc<RecordingServer> = server.into();
    let mut overrides = test_overrides();
    overrides.push(options::server(server));
    overrides.push(options::auth(Arc::new(RecordingAuth::new(log))));
    overrides.extend(extra);

    let service = Service::new(overrides);
    service.init(vec![]).unwrap();
    assert_eq!(service.state(), LifecycleState::Initialized);
    service
}

/// Wait until `service` reaches `state`.
pub async fn wait_for_state(service: &Service, state: LifecycleState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while service.state() != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("service never reached {state}, still {}", service.state()));
}
