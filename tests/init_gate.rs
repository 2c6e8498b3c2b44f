//! One-time initialization: concurrency, failure recording and wiring.

mod common;

use std::sync::{Arc, Mutex};
use std::thread;

use axum::http::HeaderMap;
use futures_util::future;

use common::{
    test_overrides, CountingCmd, CountingPlugin, EventLog, RecordingAuth, RecordingServer,
};
use servicekit::components::cmd::FlagCmd;
use servicekit::components::plugin::StaticLoader;
use servicekit::components::server::Server;
use servicekit::components::store::{MemoryStore, Store};
use servicekit::middleware::Middleware;
use servicekit::rpc::{FROM_SERVICE, TRACE_ID};
use servicekit::{options, CallError, Client, Error, LifecycleState, Request, Response, Service};

#[test]
fn test_concurrent_init_runs_sequence_once() {
    let cmd = Arc::new(CountingCmd::default());
    let plugin = Arc::new(CountingPlugin::new("audit"));

    let mut overrides = test_overrides();
    overrides.push(options::cmd(cmd.clone()));
    overrides.push(options::loader(Arc::new(
        StaticLoader::new().register(plugin.clone()),
    )));
    overrides.push(options::plugins("audit"));
    let service = Arc::new(Service::new(overrides));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || service.init(vec![]))
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(cmd.inits(), 1);
    assert_eq!(plugin.inits.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(service.state(), LifecycleState::Initialized);
}

#[test]
fn test_repeated_init_applies_overrides_only() {
    let cmd = Arc::new(CountingCmd::default());
    let mut overrides = test_overrides();
    overrides.push(options::cmd(cmd.clone()));
    let service = Service::new(overrides);

    service.init(vec![]).unwrap();
    assert!(!service.options().signal);

    service.init(vec![options::handle_signal(true)]).unwrap();
    assert!(service.options().signal);
    assert_eq!(cmd.inits(), 1);
}

#[test]
fn test_store_table_bound_to_service_name() {
    let store = Arc::new(MemoryStore::new());
    let mut overrides = test_overrides();
    overrides.push(options::name("orders"));
    overrides.push(options::store(store.clone()));
    let service = Service::new(overrides);

    service.init(vec![]).unwrap();

    assert_eq!(store.options().table, "orders");
    assert_eq!(service.options().cmd.app().name, "orders");
}

#[test]
fn test_collaborators_receive_client() {
    let log = EventLog::new();
    let store = Arc::new(MemoryStore::new());
    let mut overrides = test_overrides();
    overrides.push(options::auth(Arc::new(RecordingAuth::new(&log))));
    overrides.push(options::store(store.clone()));
    let service = Service::new(overrides);

    service.init(vec![]).unwrap();

    let opts = service.options();
    assert_eq!(log.count("auth.with_client"), 1);
    assert!(opts.registry.get().options().client.is_some());
    assert!(opts.runtime.get().options().client.is_some());
    assert!(store.options().client.is_some());
}

#[test]
fn test_flags_are_bound() {
    let mut overrides = test_overrides();
    overrides.push(options::cmd(Arc::new(FlagCmd::from_args([
        "svc",
        "--server-name",
        "billing",
        "--auth-namespace",
        "payments",
    ]))));
    let service = Service::new(overrides);

    service.init(vec![]).unwrap();

    assert_eq!(service.name(), "billing");
    assert_eq!(service.options().auth.get().options().namespace, "payments");
}

#[test]
fn test_missing_plugin_is_fatal_and_recorded() {
    let mut overrides = test_overrides();
    overrides.push(options::plugins("missing"));
    let service = Service::new(overrides);

    let err = service.init(vec![]).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, Error::Plugin { ref name, .. } if name == "missing"));
    assert_eq!(service.state(), LifecycleState::Uninitialized);

    let err = service.init(vec![]).unwrap_err();
    assert!(matches!(err, Error::InitFailed(ref msg) if msg.contains("missing")));
}

#[test]
fn test_flag_error_is_fatal() {
    let cmd = Arc::new(CountingCmd::failing());
    let mut overrides = test_overrides();
    overrides.push(options::cmd(cmd.clone()));
    let service = Service::new(overrides);

    let err = service.init(vec![]).unwrap_err();
    assert!(matches!(err, Error::Flags(_)));
    assert!(err.is_fatal());

    // Later callers see the recorded failure without re-parsing
    assert!(matches!(service.init(vec![]), Err(Error::InitFailed(_))));
    assert_eq!(cmd.inits(), 1);
}

#[test]
fn test_unknown_flag_is_rejected() {
    let mut overrides = test_overrides();
    overrides.push(options::cmd(Arc::new(FlagCmd::from_args(["svc", "--bogus"]))));
    let service = Service::new(overrides);

    assert!(matches!(service.init(vec![]), Err(Error::Flags(_))));
}

#[test]
fn test_server_replaced_in_init_gets_inbound_layers() {
    let log = EventLog::new();
    let server = Arc::new(RecordingServer::new(&log));
    let service = Service::new(test_overrides());

    service.init(vec![options::server(server.clone())]).unwrap();

    let layers: Vec<_> = server.options().wrappers.iter().map(Middleware::name).collect();
    assert_eq!(layers, vec!["stats", "trace", "auth"]);

    // A later init must not stack a second set.
    service.init(vec![]).unwrap();
    assert_eq!(server.options().wrappers.len(), 3);
}

#[tokio::test]
async fn test_client_replaced_in_init_gets_outbound_layers() {
    let seen: Arc<Mutex<Option<HeaderMap>>> = Arc::new(Mutex::new(None));
    let sink = {
        let seen = Arc::clone(&seen);
        tower::service_fn(move |request: Request| {
            *seen.lock().unwrap() = Some(request.headers().clone());
            future::ready(Ok::<_, CallError>(Response::new("pong")))
        })
    };

    let mut overrides = test_overrides();
    overrides.push(options::name("orders"));
    let service = Service::new(overrides);
    service.init(vec![options::client(Client::new(sink))]).unwrap();

    let client = service.client();
    assert!(client.is_composed());
    client
        .call(Request::new("inventory", "Stock.Get", ""))
        .await
        .unwrap();

    let headers = seen.lock().unwrap().clone().unwrap();
    assert_eq!(headers.get(&FROM_SERVICE).unwrap(), "orders");
    assert!(headers.contains_key(&TRACE_ID));
}
