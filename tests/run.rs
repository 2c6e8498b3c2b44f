//! `Service::run`: identity bootstrap, shutdown triggers and the full
//! request path over HTTP.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use futures_util::future;
use tokio_util::sync::CancellationToken;

use common::{
    recording_service, recording_service_with, test_overrides, wait_for_state, EventLog,
    RecordingAuth, RecordingProfiler, RecordingServer,
};
use servicekit::components::auth::Account;
use servicekit::components::cmd::FlagCmd;
use servicekit::components::server::Handler;
use servicekit::debug::HealthReply;
use servicekit::rpc::{FROM_SERVICE, TRACE_ID};
use servicekit::{options, CallError, Client, Error, LifecycleState, Request, Response, Service};

fn spawn_run(service: &Arc<Service>) -> tokio::task::JoinHandle<servicekit::Result<()>> {
    let service = Arc::clone(service);
    tokio::spawn(async move { service.run().await })
}

#[tokio::test]
async fn test_identity_minted_before_accept() {
    let log = EventLog::new();
    let token = CancellationToken::new();
    let server = Arc::new(RecordingServer::new(&log));
    let service = Arc::new(recording_service_with(
        &log,
        server.clone(),
        vec![
            options::name("orders"),
            options::id("i1"),
            options::context(token.clone()),
        ],
    ));

    let run = spawn_run(&service);
    wait_for_state(&service, LifecycleState::Running).await;

    let generate = log.position("auth.generate").unwrap();
    let install = log.position("auth.install_token").unwrap();
    let accept = log.position("server.start").unwrap();
    assert!(generate < install && install < accept);

    let account = service.account().unwrap();
    assert_eq!(account.id, "orders-i1");
    assert!(account.roles.contains("service"));
    assert!(server.handlers().contains(&"Debug".to_string()));

    token.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_identity_failure_prevents_accept() {
    let log = EventLog::new();
    let mut overrides = test_overrides();
    overrides.push(options::server(Arc::new(RecordingServer::new(&log))));
    overrides.push(options::auth(Arc::new(
        RecordingAuth::new(&log).failing_generate(),
    )));
    let service = Service::new(overrides);
    service.init(vec![]).unwrap();

    let err = service.run().await.unwrap_err();

    assert!(matches!(err, Error::Auth(_)));
    assert_eq!(log.count("server.start"), 0);
    assert!(service.account().is_none());
    assert_eq!(service.state(), LifecycleState::Initialized);
}

#[tokio::test]
async fn test_cancellation_stops_without_signal_handlers() {
    let log = EventLog::new();
    let token = CancellationToken::new();
    let service = Arc::new(recording_service(
        &log,
        vec![options::context(token.clone())],
    ));
    assert!(!service.options().signal);

    let run = spawn_run(&service);
    wait_for_state(&service, LifecycleState::Running).await;
    token.cancel();

    run.await.unwrap().unwrap();
    assert_eq!(service.state(), LifecycleState::Stopped);
    assert_eq!(log.count("server.stop"), 1);
}

#[tokio::test]
async fn test_injected_signal_stops_service() {
    let log = EventLog::new();
    let service = recording_service(&log, vec![]);

    service
        .run_until(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            "SIGTERM"
        })
        .await
        .unwrap();

    assert_eq!(service.state(), LifecycleState::Stopped);
    assert_eq!(log.events().last().map(String::as_str), Some("server.stop"));
}

#[tokio::test]
async fn test_signal_and_cancellation_stop_once() {
    let log = EventLog::new();
    let token = CancellationToken::new();
    let service = recording_service(&log, vec![options::context(token.clone())]);

    let cancel = token.clone();
    service
        .run_until(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
            "SIGINT"
        })
        .await
        .unwrap();

    assert_eq!(log.count("server.stop"), 1);
}

#[tokio::test]
async fn test_run_requires_initialized_service() {
    let log = EventLog::new();
    let service = recording_service(&log, vec![]);
    service.run_until(future::ready("SIGTERM")).await.unwrap();

    let err = service.run_until(future::ready("SIGTERM")).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidState {
            action: "run",
            state: LifecycleState::Stopped
        }
    ));
    assert_eq!(log.count("server.start"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_runs_mint_one_identity() {
    let log = EventLog::new();
    let mut overrides = test_overrides();
    overrides.push(options::server(Arc::new(RecordingServer::new(&log))));
    overrides.push(options::auth(Arc::new(
        RecordingAuth::new(&log).slow_generate(Duration::from_millis(50)),
    )));
    let service = Arc::new(Service::new(overrides));
    service.init(vec![]).unwrap();

    let runs: Vec<_> = (0..2)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .run_until(async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        "SIGTERM"
                    })
                    .await
            })
        })
        .collect();

    let mut results = Vec::new();
    for run in runs {
        results.push(run.await.unwrap());
    }

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(Error::InvalidState { action: "run", .. }))));
    assert_eq!(log.count("auth.generate"), 1);
    assert_eq!(log.count("server.start"), 1);
    assert_eq!(service.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_profiler_spans_the_run() {
    let log = EventLog::new();
    let service = recording_service(
        &log,
        vec![options::profile(Arc::new(RecordingProfiler::new(&log)))],
    );

    service.run_until(future::ready("SIGTERM")).await.unwrap();

    let events = log.events();
    assert!(log.position("profiler.start").unwrap() < log.position("auth.generate").unwrap());
    assert_eq!(events.last().map(String::as_str), Some("profiler.stop"));
}

#[tokio::test]
async fn test_outbound_calls_carry_identity() {
    let log = EventLog::new();
    let token = CancellationToken::new();
    let seen: Arc<Mutex<Option<HeaderMap>>> = Arc::new(Mutex::new(None));

    let sink = {
        let seen = Arc::clone(&seen);
        tower::service_fn(move |request: Request| {
            *seen.lock().unwrap() = Some(request.headers().clone());
            future::ready(Ok::<_, CallError>(Response::new("pong")))
        })
    };

    let service = Arc::new(recording_service(
        &log,
        vec![
            options::name("orders"),
            options::id("i1"),
            options::context(token.clone()),
            options::client(Client::new(sink)),
            options::cmd(Arc::new(FlagCmd::from_args([
                "orders",
                "--auth-namespace",
                "ns",
            ]))),
        ],
    ));

    let run = spawn_run(&service);
    wait_for_state(&service, LifecycleState::Running).await;

    let account = service.account().unwrap();
    assert_eq!(account.id, "orders-i1");
    assert_eq!(account.namespace, "ns");

    let reply = service
        .client()
        .call(Request::new("inventory", "Stock.Get", "{}"))
        .await
        .unwrap();
    assert_eq!(reply.body.as_ref(), b"pong");

    let access = service
        .options()
        .auth
        .get()
        .options()
        .token
        .unwrap()
        .access_token;
    let headers = seen.lock().unwrap().clone().unwrap();
    assert_eq!(headers.get(&FROM_SERVICE).unwrap(), "orders");
    assert!(headers.contains_key(&TRACE_ID));
    assert_eq!(
        headers.get(AUTHORIZATION).unwrap().to_str().unwrap(),
        format!("Bearer {access}")
    );

    token.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_http_round_trip_through_both_chains() {
    let token = CancellationToken::new();
    let mut overrides = test_overrides();
    overrides.extend([
        options::name("orders"),
        options::id("i1"),
        options::context(token.clone()),
        options::cmd(Arc::new(FlagCmd::from_args([
            "orders",
            "--auth-provider",
            "memory",
            "--auth-namespace",
            "ns",
        ]))),
    ]);
    let service = Arc::new(Service::new(overrides));
    service.init(vec![]).unwrap();
    assert_eq!(service.options().auth.get().name(), "memory");

    let whoami = tower::service_fn(|request: Request| {
        let caller = request
            .extensions()
            .get::<Account>()
            .map(|account| account.id.clone())
            .unwrap_or_default();
        future::ready(Ok::<_, CallError>(Response::new(caller)))
    });
    service.server().handle(Handler::new("Orders", whoami)).unwrap();

    let run = spawn_run(&service);
    wait_for_state(&service, LifecycleState::Running).await;

    // Self call: outbound chain attaches the token, inbound chain verifies it
    let reply = service
        .client()
        .call(Request::new("orders", "Orders.Whoami", ""))
        .await
        .unwrap();
    assert_eq!(reply.body.as_ref(), b"orders-i1");

    let address = service.server().options().address;
    let http = reqwest::Client::new();

    let anonymous = http
        .post(format!("http://{address}/Orders.Whoami"))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let health: HealthReply = http
        .post(format!("http://{address}/Debug.Health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "ok");

    token.cancel();
    run.await.unwrap().unwrap();

    let registry = service.options().registry.get();
    assert!(registry.get_service("orders").unwrap().is_empty());
}

#[tokio::test]
async fn test_default_auth_admits_management_calls() {
    let token = CancellationToken::new();
    let mut overrides = test_overrides();
    overrides.extend([options::name("greeter"), options::context(token.clone())]);
    let service = Arc::new(Service::new(overrides));
    service.init(vec![]).unwrap();
    assert_eq!(service.options().auth.get().name(), "noop");

    let echo = tower::service_fn(|request: Request| {
        future::ready(Ok::<_, CallError>(Response::new(request.body().clone())))
    });
    service.server().handle(Handler::new("Greeter", echo)).unwrap();

    let run = spawn_run(&service);
    wait_for_state(&service, LifecycleState::Running).await;

    let address = service.server().options().address;
    let http = reqwest::Client::new();
    let calls = [
        ("Debug.Stats", ""),
        ("Debug.Trace", ""),
        ("Debug.Trace", r#"{"trace_id":"t-1"}"#),
        ("Greeter.Hello", r#"{"name":"ada"}"#),
    ];
    for (endpoint, body) in calls {
        for bearer in [None, Some("anything")] {
            let mut request = http
                .post(format!("http://{address}/{endpoint}"))
                .body(body);
            if let Some(bearer) = bearer {
                request = request.bearer_auth(bearer);
            }
            let reply = request.send().await.unwrap();
            assert_eq!(reply.status(), StatusCode::OK, "{endpoint} with {bearer:?}");
        }
    }

    token.cancel();
    run.await.unwrap().unwrap();
}
