//! In-memory URL state store backed by durable persistence

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::persistence::StatePersistence;
use crate::probe::ProbeResult;
use crate::status::{UrlState, UrlStatus};
use crate::transition::{self, Transition};
use crate::PingwatchError;

/// Counts of URLs per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub up: usize,
    pub down: usize,
    pub unknown: usize,
}

impl StatusSummary {
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a UrlStatus>) -> Self {
        statuses
            .into_iter()
            .fold(StatusSummary::default(), |mut summary, status| {
                summary.total += 1;
                match status.state {
                    UrlState::Up => summary.up += 1,
                    UrlState::Down => summary.down += 1,
                    UrlState::Unknown => summary.unknown += 1,
                }
                summary
            })
    }
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} URLs: {} up, {} down, {} unknown",
            self.total, self.up, self.down, self.unknown
        )
    }
}

/// Summary line followed by one detail line per URL
pub fn render_status_report(statuses: &[UrlStatus]) -> String {
    let mut report = format!("{}\n", StatusSummary::from_statuses(statuses));

    for status in statuses {
        let uptime = status
            .uptime_percentage()
            .map(|p| format!("{:.1}%", p))
            .unwrap_or_else(|| "N/A".to_string());
        let average = status
            .average_response_time
            .map(|secs| format!("{:.3}s", secs))
            .unwrap_or_else(|| "N/A".to_string());

        report.push_str(&format!(
            "  {} [{}] checks={} failures={} uptime={} avg={} last_check={}",
            status.url,
            status.state,
            status.total_checks,
            status.total_failures,
            uptime,
            average,
            status.last_check.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        ));
        if status.state == UrlState::Down {
            if let Some(error) = &status.last_error_message {
                report.push_str(&format!(" error=\"{}\"", error));
            }
        }
        report.push('\n');
    }
    report
}

/// A transition together with the outcome of persisting it
#[derive(Debug)]
pub struct Recorded {
    pub transition: Transition,
    /// Set when writing the store failed. The transition stands regardless.
    pub persist_error: Option<PingwatchError>,
}

/// Shared mapping of URL to status.
///
/// Every mutation persists the whole mapping while holding the store lock, so
/// writes to the durable file never interleave and snapshots are consistent.
pub struct StateStore {
    statuses: Mutex<HashMap<String, UrlStatus>>,
    persistence: Arc<dyn StatePersistence>,
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore").finish_non_exhaustive()
    }
}

impl StateStore {
    /// An empty store that writes through to `persistence`
    pub fn new(persistence: Arc<dyn StatePersistence>) -> Self {
        Self::with_statuses(persistence, HashMap::new())
    }

    pub fn with_statuses(
        persistence: Arc<dyn StatePersistence>,
        statuses: HashMap<String, UrlStatus>,
    ) -> Self {
        Self {
            statuses: Mutex::new(statuses),
            persistence,
        }
    }

    /// Rehydrate from `persistence`, starting empty if the stored state is unreadable
    pub async fn open(persistence: Arc<dyn StatePersistence>) -> Self {
        let statuses = match persistence.load().await {
            Ok(statuses) => statuses,
            Err(e) => {
                tracing::error!("Failed to load stored state, starting empty: {}", e);
                HashMap::new()
            }
        };
        Self::with_statuses(persistence, statuses)
    }

    /// Fold a probe result into its URL's status and persist the store
    pub async fn record(&self, result: &ProbeResult) -> Recorded {
        let mut statuses = self.statuses.lock().await;

        let current = statuses.get(&result.url).cloned();
        let transition = transition::update(current, result);
        statuses.insert(result.url.clone(), transition.status.clone());

        if transition.state_changed {
            tracing::info!(
                "{} changed state: {} -> {}",
                result.url,
                transition.previous_state,
                transition.status.state
            );
        }

        let persist_error = self.persist(&statuses).await;
        Recorded {
            transition,
            persist_error,
        }
    }

    pub async fn get(&self, url: &str) -> Option<UrlStatus> {
        self.statuses.lock().await.get(url).cloned()
    }

    /// Copy of every status, ordered by URL
    pub async fn snapshot(&self) -> Vec<UrlStatus> {
        let mut statuses: Vec<UrlStatus> = self.statuses.lock().await.values().cloned().collect();
        statuses.sort_by(|a, b| a.url.cmp(&b.url));
        statuses
    }

    pub async fn summary(&self) -> StatusSummary {
        StatusSummary::from_statuses(self.statuses.lock().await.values())
    }

    pub async fn len(&self) -> usize {
        self.statuses.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.statuses.lock().await.is_empty()
    }

    /// Remove entries whose last check is older than `retention`, returning their URLs
    pub async fn evict_stale(
        &self,
        retention: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        // A window reaching past the earliest representable time keeps everything
        let Some(cutoff) = now.checked_sub_signed(retention) else {
            return Vec::new();
        };
        let mut statuses = self.statuses.lock().await;

        let mut stale: Vec<String> = statuses
            .values()
            .filter(|status| status.last_check < cutoff)
            .map(|status| status.url.clone())
            .collect();
        stale.sort();

        for url in &stale {
            statuses.remove(url);
            tracing::info!("Evicted stale state for {}", url);
        }

        if !stale.is_empty() {
            self.persist(&statuses).await;
        }
        stale
    }

    /// Clear both alert flags for a URL. Returns false if the URL is unknown.
    pub async fn reset_alerts(&self, url: &str) -> bool {
        let mut statuses = self.statuses.lock().await;
        let Some(status) = statuses.get_mut(url) else {
            return false;
        };
        status.alert_sent = false;
        status.recovery_alert_sent = false;
        tracing::info!("Reset alert flags for {}", url);

        self.persist(&statuses).await;
        true
    }

    async fn persist(&self, statuses: &HashMap<String, UrlStatus>) -> Option<PingwatchError> {
        match self.persistence.save(statuses).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Failed to persist state, keeping in-memory state: {}", e);
                Some(e)
            }
        }
    }
}
