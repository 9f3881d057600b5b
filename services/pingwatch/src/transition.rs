//! State transition engine: folds a probe result into a URL's status and
//! decides whether an alert must go out.
//!
//! Alert deduplication rests on two flags on [`UrlStatus`]:
//!
//! * entering `DOWN` clears both `alert_sent` and `recovery_alert_sent`, so
//!   every UP -> DOWN transition starts a fresh downtime episode and fires
//!   exactly one DOWN alert;
//! * entering `UP` clears only `recovery_alert_sent`, so a RECOVERY alert
//!   fires only when a DOWN alert went out for the episode being closed.
//!
//! Transitions out of `UNKNOWN` never alert: the first result for a URL only
//! establishes a baseline.

use std::fmt;

use crate::probe::ProbeResult;
use crate::status::{UrlState, UrlStatus};

/// Weight of the newest sample in the response time moving average
pub const EMA_ALPHA: f64 = 0.3;

/// Which alert a transition calls for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Down,
    Recovery,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Down => write!(f, "DOWN"),
            AlertKind::Recovery => write!(f, "RECOVERY"),
        }
    }
}

/// Result of applying one probe result
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub status: UrlStatus,
    pub previous_state: UrlState,
    pub state_changed: bool,
    pub alert: Option<AlertKind>,
}

impl Transition {
    pub fn should_alert(&self) -> bool {
        self.alert.is_some()
    }
}

/// Apply a probe result to the current status of its URL.
///
/// `current` is `None` the first time a URL is seen.
pub fn update(current: Option<UrlStatus>, result: &ProbeResult) -> Transition {
    let mut status = current.unwrap_or_else(|| UrlStatus::new(&result.url, result.timestamp));
    let previous_state = status.state;

    status.last_check = result.timestamp;
    status.total_checks += 1;

    let new_state = if result.success {
        UrlState::Up
    } else {
        UrlState::Down
    };

    if result.success {
        status.consecutive_successes += 1;
        status.consecutive_failures = 0;
        if let Some(latency) = result.latency {
            let sample = latency.as_secs_f64();
            status.average_response_time = Some(match status.average_response_time {
                Some(average) => EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * average,
                None => sample,
            });
        }
    } else {
        status.consecutive_failures += 1;
        status.consecutive_successes = 0;
        status.total_failures += 1;
        status.last_error_message = result.error.clone();
    }

    let state_changed = new_state != previous_state;
    if state_changed {
        status.state = new_state;
        status.last_state_change = result.timestamp;
        match new_state {
            UrlState::Down => {
                status.alert_sent = false;
                status.recovery_alert_sent = false;
            }
            UrlState::Up => status.recovery_alert_sent = false,
            UrlState::Unknown => {}
        }
    }

    let alert = decide_alert(&mut status, previous_state, state_changed);

    Transition {
        status,
        previous_state,
        state_changed,
        alert,
    }
}

/// Must run after the flag resets in [`update`]; sets the flag of the alert it fires.
fn decide_alert(
    status: &mut UrlStatus,
    previous_state: UrlState,
    state_changed: bool,
) -> Option<AlertKind> {
    if !state_changed {
        return None;
    }

    match (previous_state, status.state) {
        (UrlState::Up, UrlState::Down) if !status.alert_sent => {
            status.alert_sent = true;
            Some(AlertKind::Down)
        }
        (UrlState::Down, UrlState::Up) if status.alert_sent && !status.recovery_alert_sent => {
            status.recovery_alert_sent = true;
            Some(AlertKind::Recovery)
        }
        _ => None,
    }
}
