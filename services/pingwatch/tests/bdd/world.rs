//! BDD test world and test doubles for pingwatch

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cucumber::World;
use tempfile::TempDir;
use tokio::sync::RwLock;

use pingwatch::config::{Config, MonitorConfig};
use pingwatch::io::{EmailMessage, MailTransport};
use pingwatch::notifier::Notifier;
use pingwatch::probe::{Probe, ProbeResult};
use pingwatch::{AlertKind, PingwatchError, StateStore, Transition, UrlStatus};

// --- Test doubles ---

/// A probe that replays scripted outcomes, then keeps succeeding
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    outcomes: RwLock<VecDeque<bool>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(outcomes: Vec<bool>) -> Self {
        Self {
            outcomes: RwLock::new(outcomes.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, target: &MonitorConfig) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ok = self.outcomes.write().await.pop_front().unwrap_or(true);
        if ok {
            ProbeResult::success(&target.url, 200, Duration::from_millis(20), Utc::now())
        } else {
            ProbeResult::failure(&target.url, "Connection error: refused", Utc::now())
        }
    }
}

/// A notifier that records every alert and summary, optionally failing each one
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub fail: bool,
    pub alerts: RwLock<Vec<(AlertKind, String)>>,
    pub summaries: RwLock<Vec<usize>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn outcome(&self) -> pingwatch::Result<()> {
        if self.fail {
            Err(PingwatchError::Notifier("test failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send_down_alert(&self, status: &UrlStatus) -> pingwatch::Result<()> {
        self.alerts
            .write()
            .await
            .push((AlertKind::Down, status.url.clone()));
        self.outcome()
    }

    async fn send_recovery_alert(&self, status: &UrlStatus) -> pingwatch::Result<()> {
        self.alerts
            .write()
            .await
            .push((AlertKind::Recovery, status.url.clone()));
        self.outcome()
    }

    async fn send_summary(&self, statuses: &[UrlStatus]) -> pingwatch::Result<()> {
        self.summaries.write().await.push(statuses.len());
        self.outcome()
    }

    async fn test_connection(&self) -> pingwatch::Result<()> {
        self.outcome()
    }
}

/// A mail transport that records messages instead of speaking SMTP
#[derive(Debug, Default)]
pub struct RecordingMailTransport {
    pub fail: bool,
    pub sent: RwLock<Vec<EmailMessage>>,
}

#[async_trait::async_trait]
impl MailTransport for RecordingMailTransport {
    async fn send(&self, message: &EmailMessage) -> pingwatch::Result<()> {
        if self.fail {
            return Err(PingwatchError::Notifier("relay refused".to_string()));
        }
        self.sent.write().await.push(message.clone());
        Ok(())
    }

    async fn test_connection(&self) -> pingwatch::Result<()> {
        if self.fail {
            return Err(PingwatchError::Notifier("relay refused".to_string()));
        }
        Ok(())
    }
}

// --- World ---

#[derive(Debug, Default, World)]
pub struct PingwatchWorld {
    // Transition testing
    pub status: Option<UrlStatus>,
    pub transitions: Vec<Transition>,

    // Persistence testing
    pub state_dir: Option<TempDir>,
    pub store: Option<Arc<StateStore>>,
    pub evicted: Vec<String>,

    // Notification testing
    pub mail: Option<Arc<RecordingMailTransport>>,
    pub notifier: Option<Arc<RecordingNotifier>>,
    pub send_result: Option<pingwatch::Result<()>>,

    // Lifecycle testing
    pub config: Option<Config>,
    pub probe: Option<Arc<ScriptedProbe>>,
    pub build_error: Option<String>,
    pub start_succeeded: Option<bool>,
    pub reset_result: Option<bool>,
}

impl PingwatchWorld {
    /// Path of the state file inside this scenario's temporary directory
    pub fn state_path(&mut self) -> PathBuf {
        self.state_dir
            .get_or_insert_with(|| tempfile::tempdir().expect("failed to create temp dir"))
            .path()
            .join("pingwatch_state.json")
    }
}
