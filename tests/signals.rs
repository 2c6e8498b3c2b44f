//! Real OS signals reaching `Service::run`.
#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};

use common::{recording_service, wait_for_state, EventLog};
use servicekit::lifecycle::{ShutdownTrigger, Trigger};
use servicekit::{options, LifecycleState};
use tokio_util::sync::CancellationToken;

fn send_sigterm() {
    let status = std::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn test_sigterm_stops_running_service() {
    // Keeps the default disposition from killing the test binary while the
    // service installs its own handlers
    let _guard = signal(SignalKind::terminate()).unwrap();

    let log = EventLog::new();
    let service = Arc::new(recording_service(&log, vec![options::handle_signal(true)]));

    let run = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.run().await })
    };
    wait_for_state(&service, LifecycleState::Running).await;

    // Handlers are armed just after the state flips; repeat until observed
    let result = tokio::time::timeout(Duration::from_secs(5), async move {
        loop {
            send_sigterm();
            tokio::time::sleep(Duration::from_millis(50)).await;
            if run.is_finished() {
                break run.await;
            }
        }
    })
    .await
    .unwrap();

    result.unwrap().unwrap();
    assert_eq!(service.state(), LifecycleState::Stopped);
    assert_eq!(log.count("server.stop"), 1);
}

#[tokio::test]
async fn test_trigger_reports_signal_name() {
    let _guard = signal(SignalKind::terminate()).unwrap();
    let trigger = ShutdownTrigger::arm(true, CancellationToken::new()).unwrap();

    let waiter = tokio::spawn(trigger.wait());
    send_sigterm();

    let fired = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fired, Trigger::Signal("SIGTERM"));
}
