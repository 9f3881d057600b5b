//! BDD step definitions for pingwatch builder and lifecycle feature

use std::sync::Arc;
use std::time::Duration;

use cucumber::{given, then, when};
use tokio_util::sync::CancellationToken;

use pingwatch::config::{Config, EmailConfig, MonitorConfig};
use pingwatch::notifier::Notifier;
use pingwatch::probe::Probe;
use pingwatch::{Pingwatch, PingwatchBuilder};

use crate::world::{PingwatchWorld, RecordingNotifier, ScriptedProbe};

fn email_config() -> EmailConfig {
    EmailConfig {
        smtp_server: "smtp.example.com".to_string(),
        username: "monitor".to_string(),
        password: "secret".to_string(),
        from_email: "monitor@example.com".to_string(),
        to_emails: vec!["ops@example.com".to_string()],
        ..EmailConfig::default()
    }
}

async fn build(world: &mut PingwatchWorld, cancel: CancellationToken) -> pingwatch::Result<Pingwatch> {
    let mut config = world.config.clone().expect("config not set");
    config.state_file = world.state_path();

    let probe = world
        .probe
        .get_or_insert_with(|| Arc::new(ScriptedProbe::default()))
        .clone();
    let notifier = world
        .notifier
        .get_or_insert_with(|| Arc::new(RecordingNotifier::default()))
        .clone();

    PingwatchBuilder::new(config)
        .with_probe(probe as Arc<dyn Probe>)
        .with_notifier(notifier as Arc<dyn Notifier>)
        .with_cancellation_token(cancel)
        .build()
        .await
}

// --- Given steps ---

#[given("a pingwatch config without monitors")]
fn config_without_monitors(world: &mut PingwatchWorld) {
    world.config = Some(Config {
        email: email_config(),
        ..Config::default()
    });
}

#[given(expr = "a pingwatch config monitoring {string}")]
fn config_monitoring(world: &mut PingwatchWorld, url: String) {
    world.config = Some(Config {
        email: email_config(),
        monitors: vec![MonitorConfig::new(url)],
        ..Config::default()
    });
}

#[given(expr = "a check interval of {int} second(s)")]
fn check_interval(world: &mut PingwatchWorld, seconds: u64) {
    let config = world.config.as_mut().expect("config not set");
    config.check_interval_seconds = seconds;
}

#[given(expr = "probes that report {string}")]
fn probes_that_report(world: &mut PingwatchWorld, outcomes: String) {
    let outcomes = outcomes.split(',').map(|o| o.trim() == "success").collect();
    world.probe = Some(Arc::new(ScriptedProbe::new(outcomes)));
}

// --- When steps ---

#[when("the service is built")]
async fn service_is_built(world: &mut PingwatchWorld) {
    if let Err(e) = build(world, CancellationToken::new()).await {
        world.build_error = Some(e.to_string());
    }
}

#[when("the service is built and started with a cancelled token")]
async fn built_and_started_cancelled(world: &mut PingwatchWorld) {
    let cancel = CancellationToken::new();
    cancel.cancel();
    match build(world, cancel).await {
        Ok(service) => world.start_succeeded = Some(service.start().await.is_ok()),
        Err(e) => world.build_error = Some(e.to_string()),
    }
}

#[when(expr = "the service runs for {int} milliseconds")]
async fn service_runs(world: &mut PingwatchWorld, millis: u64) {
    let cancel = CancellationToken::new();
    let service = build(world, cancel.clone())
        .await
        .expect("failed to build service");

    let handle = tokio::spawn(service.start());
    tokio::time::sleep(Duration::from_millis(millis)).await;
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("service did not stop after cancellation")
        .expect("service task panicked");
    world.start_succeeded = Some(outcome.is_ok());
}

#[when(expr = "alerts are reset for {string}")]
async fn alerts_reset(world: &mut PingwatchWorld, url: String) {
    // Release the store from earlier steps so the service reads the file
    world.store = None;
    let service = build(world, CancellationToken::new())
        .await
        .expect("failed to build service");
    world.reset_result = Some(service.reset_alerts(&url).await);
}

#[when("a summary report is requested")]
async fn summary_requested(world: &mut PingwatchWorld) {
    world.store = None;
    let service = build(world, CancellationToken::new())
        .await
        .expect("failed to build service");
    service
        .send_summary_now()
        .await
        .expect("summary report failed");
}

// --- Then steps ---

#[then(expr = "the build should fail with {string}")]
fn build_fails(world: &mut PingwatchWorld, expected: String) {
    let error = world.build_error.as_ref().expect("Expected build to fail");
    assert!(
        error.contains(&expected),
        "Expected build error to contain '{}', got '{}'",
        expected,
        error
    );
}

#[then("the lifecycle should complete successfully")]
fn lifecycle_completes(world: &mut PingwatchWorld) {
    assert_eq!(world.build_error, None, "Expected build to succeed");
    assert_eq!(
        world.start_succeeded,
        Some(true),
        "Expected start to succeed"
    );
}

#[then(expr = "the URL should have been probed {int} times")]
fn probed_exactly(world: &mut PingwatchWorld, count: usize) {
    let probe = world.probe.as_ref().expect("probe not set");
    assert_eq!(probe.calls(), count);
}

#[then(expr = "the URL should have been probed at least {int} time(s)")]
fn probed_at_least(world: &mut PingwatchWorld, count: usize) {
    let probe = world.probe.as_ref().expect("probe not set");
    assert!(
        probe.calls() >= count,
        "Expected at least {} probes, got {}",
        count,
        probe.calls()
    );
}

#[then(expr = "the state file should record {string} as {string}")]
fn state_file_records(world: &mut PingwatchWorld, url: String, state: String) {
    let path = world.state_path();
    let content = std::fs::read_to_string(&path).expect("state file missing");
    let json: serde_json::Value = serde_json::from_str(&content).expect("state file is not JSON");
    assert_eq!(json[&url]["state"], serde_json::Value::String(state));
}

#[then(expr = "a {word} alert should have been sent for {string}")]
async fn alert_sent_for(world: &mut PingwatchWorld, kind: String, url: String) {
    let notifier = world.notifier.as_ref().expect("notifier not set");
    let alerts = notifier.alerts.read().await;
    assert!(
        alerts
            .iter()
            .any(|(k, u)| k.to_string() == kind && *u == url),
        "Expected a {} alert for {}, got {:?}",
        kind,
        url,
        *alerts
    );
}

#[then(expr = "the reset should report {word}")]
fn reset_reports(world: &mut PingwatchWorld, expected: String) {
    let expected = expected == "success";
    assert_eq!(world.reset_result, Some(expected));
}

#[then(expr = "the state file should show {string} with cleared alert flags")]
fn state_file_cleared_flags(world: &mut PingwatchWorld, url: String) {
    let path = world.state_path();
    let content = std::fs::read_to_string(&path).expect("state file missing");
    let json: serde_json::Value = serde_json::from_str(&content).expect("state file is not JSON");
    assert_eq!(json[&url]["alert_sent"], serde_json::Value::Bool(false));
    assert_eq!(
        json[&url]["recovery_alert_sent"],
        serde_json::Value::Bool(false)
    );
}

#[then(expr = "a summary covering {int} URL(s) should have been sent")]
async fn summary_sent(world: &mut PingwatchWorld, count: usize) {
    let notifier = world.notifier.as_ref().expect("notifier not set");
    assert_eq!(*notifier.summaries.read().await, vec![count]);
}
