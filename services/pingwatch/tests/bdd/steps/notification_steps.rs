//! BDD step definitions for notification feature

use std::sync::Arc;

use chrono::Utc;
use cucumber::{given, then, when};

use pingwatch::config::{EmailConfig, MonitorConfig};
use pingwatch::email::EmailNotifier;
use pingwatch::io::MailTransport;
use pingwatch::notifier::Notifier;
use pingwatch::persistence::JsonFilePersistence;
use pingwatch::scheduler::check_once;
use pingwatch::{StateStore, UrlState, UrlStatus};

use crate::world::{PingwatchWorld, RecordingMailTransport, RecordingNotifier, ScriptedProbe};

fn email_notifier(world: &PingwatchWorld, recipients: &[String]) -> EmailNotifier {
    let config = EmailConfig {
        to_emails: recipients.to_vec(),
        ..EmailConfig::default()
    };
    let mail = world.mail.as_ref().expect("mail transport not set");
    EmailNotifier::new(&config, Arc::clone(mail) as Arc<dyn MailTransport>)
}

fn recipients(list: &str) -> Vec<String> {
    list.split(',').map(|r| r.trim().to_string()).collect()
}

fn down_status(url: &str, error: &str) -> UrlStatus {
    let mut status = UrlStatus::new(url, Utc::now());
    status.state = UrlState::Down;
    status.consecutive_failures = 1;
    status.total_failures = 1;
    status.total_checks = 5;
    status.last_error_message = Some(error.to_string());
    status
}

// --- Given steps ---

#[given("a recording mail transport")]
fn recording_transport(world: &mut PingwatchWorld) {
    world.mail = Some(Arc::new(RecordingMailTransport::default()));
}

#[given("a mail transport that rejects every message")]
fn failing_transport(world: &mut PingwatchWorld) {
    world.mail = Some(Arc::new(RecordingMailTransport {
        fail: true,
        ..RecordingMailTransport::default()
    }));
}

#[given("a notifier that fails every delivery")]
fn failing_notifier(world: &mut PingwatchWorld) {
    world.notifier = Some(Arc::new(RecordingNotifier::failing()));
}

// --- When steps ---

#[when(expr = "a DOWN alert for {string} with error {string} is emailed to {string}")]
async fn down_alert_emailed(world: &mut PingwatchWorld, url: String, error: String, to: String) {
    let notifier = email_notifier(world, &recipients(&to));
    world.send_result = Some(notifier.send_down_alert(&down_status(&url, &error)).await);
}

#[when(expr = "a RECOVERY alert for {string} is emailed to {string}")]
async fn recovery_alert_emailed(world: &mut PingwatchWorld, url: String, to: String) {
    let notifier = email_notifier(world, &recipients(&to));
    let mut status = UrlStatus::new(&url, Utc::now());
    status.state = UrlState::Up;
    status.consecutive_successes = 1;
    status.total_checks = 4;
    status.total_failures = 1;
    world.send_result = Some(notifier.send_recovery_alert(&status).await);
}

#[when(expr = "a summary of {int} down and {int} up URLs is emailed to {string}")]
async fn summary_emailed(world: &mut PingwatchWorld, down: usize, up: usize, to: String) {
    let notifier = email_notifier(world, &recipients(&to));
    let mut statuses = Vec::new();
    for i in 0..down {
        statuses.push(down_status(
            &format!("https://down-{}.example", i),
            "Request timeout after 30s",
        ));
    }
    for i in 0..up {
        let mut status = UrlStatus::new(format!("https://up-{}.example", i), Utc::now());
        status.state = UrlState::Up;
        status.average_response_time = Some(0.2);
        statuses.push(status);
    }
    world.send_result = Some(notifier.send_summary(&statuses).await);
}

#[when(expr = "{string} is checked with outcomes {string}")]
async fn url_checked(world: &mut PingwatchWorld, url: String, outcomes: String) {
    let outcomes: Vec<bool> = outcomes.split(',').map(|o| o.trim() == "success").collect();
    let checks = outcomes.len();
    let probe = ScriptedProbe::new(outcomes);
    let store = StateStore::new(Arc::new(JsonFilePersistence::new(world.state_path())));
    let notifier = Arc::clone(world.notifier.as_ref().expect("notifier not set"));
    let monitor = MonitorConfig::new(url);

    for _ in 0..checks {
        check_once(&probe, notifier.as_ref(), &store, &monitor).await;
    }
    world.store = Some(Arc::new(store));
}

// --- Then steps ---

#[then(expr = "{int} email(s) should have been sent")]
async fn emails_sent(world: &mut PingwatchWorld, count: usize) {
    let mail = world.mail.as_ref().expect("mail transport not set");
    assert_eq!(mail.sent.read().await.len(), count);
}

#[then(expr = "the email should go to {int} recipients")]
async fn email_recipients(world: &mut PingwatchWorld, count: usize) {
    let mail = world.mail.as_ref().expect("mail transport not set");
    let sent = mail.sent.read().await;
    let last = sent.last().expect("no email sent");
    assert_eq!(last.recipients.len(), count);
}

#[then(expr = "the email subject should be {string}")]
async fn email_subject(world: &mut PingwatchWorld, expected: String) {
    let mail = world.mail.as_ref().expect("mail transport not set");
    let sent = mail.sent.read().await;
    let last = sent.last().expect("no email sent");
    assert_eq!(last.subject, expected);
}

#[then(expr = "the email text should contain {string}")]
async fn email_text_contains(world: &mut PingwatchWorld, expected: String) {
    let mail = world.mail.as_ref().expect("mail transport not set");
    let sent = mail.sent.read().await;
    let last = sent.last().expect("no email sent");
    assert!(
        last.body_text.contains(&expected),
        "Expected email text to contain '{}', got '{}'",
        expected,
        last.body_text
    );
}

#[then("the email should have an HTML alternative")]
async fn email_has_html(world: &mut PingwatchWorld) {
    let mail = world.mail.as_ref().expect("mail transport not set");
    let sent = mail.sent.read().await;
    let last = sent.last().expect("no email sent");
    let html = last.body_html.as_ref().expect("no HTML body");
    assert!(html.starts_with("<html>"));
}

#[then(expr = "the send should fail with {string}")]
fn send_fails(world: &mut PingwatchWorld, expected: String) {
    match world.send_result.as_ref().expect("nothing was sent") {
        Ok(()) => panic!("Expected the send to fail"),
        Err(e) => assert!(
            e.to_string().contains(&expected),
            "Expected error to contain '{}', got '{}'",
            expected,
            e
        ),
    }
}

#[then(expr = "exactly {int} DOWN alert delivery should have been attempted")]
async fn down_attempts(world: &mut PingwatchWorld, count: usize) {
    let notifier = world.notifier.as_ref().expect("notifier not set");
    let alerts = notifier.alerts.read().await;
    assert_eq!(alerts.len(), count, "attempted alerts: {:?}", *alerts);
}

#[then(expr = "{string} should remain marked as alerted")]
async fn remains_alerted(world: &mut PingwatchWorld, url: String) {
    let store = world.store.as_ref().expect("store not set");
    let status = store.get(&url).await.expect("URL not in store");
    assert_eq!(status.state, UrlState::Down);
    assert!(status.alert_sent);
}
