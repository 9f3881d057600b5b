//! Notifier trait for sending alerts and summaries

use async_trait::async_trait;

use crate::status::UrlStatus;
use crate::transition::AlertKind;

/// Trait for delivering alerts. Delivery is best-effort: callers log failures
/// and never retry.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Announce that a URL went down
    async fn send_down_alert(&self, status: &UrlStatus) -> crate::Result<()>;

    /// Announce that a URL came back after an alerted downtime
    async fn send_recovery_alert(&self, status: &UrlStatus) -> crate::Result<()>;

    /// Report the state of every monitored URL
    async fn send_summary(&self, statuses: &[UrlStatus]) -> crate::Result<()>;

    /// Check that alerts could be delivered right now
    async fn test_connection(&self) -> crate::Result<()>;
}

/// Send the alert matching `kind`
pub async fn send_alert(
    notifier: &dyn Notifier,
    kind: AlertKind,
    status: &UrlStatus,
) -> crate::Result<()> {
    match kind {
        AlertKind::Down => notifier.send_down_alert(status).await,
        AlertKind::Recovery => notifier.send_recovery_alert(status).await,
    }
}
