//! Per-URL status record and state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Up/down state of a monitored URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UrlState {
    Up,
    Down,
    #[default]
    Unknown,
}

impl fmt::Display for UrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlState::Up => write!(f, "UP"),
            UrlState::Down => write!(f, "DOWN"),
            UrlState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Everything pingwatch remembers about one URL across checks and restarts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlStatus {
    pub url: String,
    #[serde(default)]
    pub state: UrlState,
    pub last_check: DateTime<Utc>,
    pub last_state_change: DateTime<Utc>,
    #[serde(default)]
    pub consecutive_failures: u64,
    #[serde(default)]
    pub consecutive_successes: u64,
    #[serde(default)]
    pub total_checks: u64,
    #[serde(default)]
    pub total_failures: u64,
    /// A DOWN alert went out for the current downtime episode
    #[serde(default)]
    pub alert_sent: bool,
    /// A RECOVERY alert went out since the last DOWN alert
    #[serde(default)]
    pub recovery_alert_sent: bool,
    #[serde(default)]
    pub last_error_message: Option<String>,
    /// Moving average of successful response times, in seconds
    #[serde(default)]
    pub average_response_time: Option<f64>,
}

impl UrlStatus {
    /// A fresh record for a URL that has never been checked
    pub fn new(url: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            state: UrlState::Unknown,
            last_check: now,
            last_state_change: now,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_checks: 0,
            total_failures: 0,
            alert_sent: false,
            recovery_alert_sent: false,
            last_error_message: None,
            average_response_time: None,
        }
    }

    /// Fraction of checks that succeeded, if any checks ran
    pub fn uptime_percentage(&self) -> Option<f64> {
        if self.total_checks == 0 {
            return None;
        }
        let successes = self.total_checks.saturating_sub(self.total_failures);
        Some(successes as f64 * 100.0 / self.total_checks as f64)
    }
}
