//! Scheduler: runs one check loop per URL plus the sweep and summary loops

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{Config, MonitorConfig};
use crate::notifier::{self, Notifier};
use crate::probe::Probe;
use crate::store::StateStore;
use crate::transition::Transition;

/// A URL together with how often to check it
#[derive(Debug, Clone)]
pub struct CheckTarget {
    pub monitor: MonitorConfig,
    pub interval: Duration,
}

/// Timing of the background loops
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub error_backoff: Duration,
    pub retention: chrono::Duration,
    pub cleanup_interval: Duration,
    pub shutdown_grace: Duration,
    pub summary_interval: Option<Duration>,
}

impl ScheduleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            error_backoff: config.error_backoff(),
            retention: config.retention(),
            cleanup_interval: config.cleanup_interval(),
            shutdown_grace: config.shutdown_grace(),
            summary_interval: config.summary_interval(),
        }
    }
}

/// The scheduler drives probes, state updates and alert dispatch
pub struct Scheduler {
    targets: Vec<CheckTarget>,
    settings: ScheduleSettings,
    probe: Arc<dyn Probe>,
    notifier: Arc<dyn Notifier>,
    store: Arc<StateStore>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        targets: Vec<CheckTarget>,
        settings: ScheduleSettings,
        probe: Arc<dyn Probe>,
        notifier: Arc<dyn Notifier>,
        store: Arc<StateStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            targets,
            settings,
            probe,
            notifier,
            store,
            cancel,
        }
    }

    /// Build a scheduler for every monitor in `config`
    pub fn from_config(
        config: &Config,
        probe: Arc<dyn Probe>,
        notifier: Arc<dyn Notifier>,
        store: Arc<StateStore>,
        cancel: CancellationToken,
    ) -> Self {
        let targets = config
            .monitors
            .iter()
            .map(|monitor| CheckTarget {
                monitor: monitor.clone(),
                interval: config.check_interval_for(monitor),
            })
            .collect();
        Self::new(
            targets,
            ScheduleSettings::from_config(config),
            probe,
            notifier,
            store,
            cancel,
        )
    }

    /// Start every loop. Returns once the cancellation token is triggered and
    /// the loops have exited or the grace period has run out.
    pub async fn run(&self) {
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        for target in &self.targets {
            let span = tracing::info_span!("check", url = %target.monitor.url);
            handles.push(tokio::spawn(
                check_loop(
                    target.clone(),
                    self.settings.error_backoff,
                    Arc::clone(&self.probe),
                    Arc::clone(&self.notifier),
                    Arc::clone(&self.store),
                    self.cancel.clone(),
                )
                .instrument(span),
            ));
        }

        handles.push(tokio::spawn(sweep_loop(
            Arc::clone(&self.store),
            self.settings.retention,
            self.settings.cleanup_interval,
            self.cancel.clone(),
        )));

        if let Some(interval) = self.settings.summary_interval {
            handles.push(tokio::spawn(summary_loop(
                Arc::clone(&self.store),
                Arc::clone(&self.notifier),
                interval,
                self.cancel.clone(),
            )));
        }

        tracing::info!("Scheduler started with {} check loops", self.targets.len());

        self.cancel.cancelled().await;

        let grace = self.settings.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            for handle in handles.iter_mut() {
                if let Err(e) = handle.await {
                    tracing::error!("Scheduler loop ended abnormally: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                "Loops still running after {:?} grace period, aborting them",
                grace
            );
            for handle in &handles {
                handle.abort();
            }
            // Wait for the aborted loops to drop, which aborts their in-flight checks
            for handle in handles {
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        tracing::error!("Scheduler loop ended abnormally: {}", e);
                    }
                }
            }
        }

        tracing::info!("Scheduler stopped");
    }
}

/// Probe one URL, fold the result into the store and send any alert it calls for
pub async fn check_once(
    probe: &dyn Probe,
    notifier: &dyn Notifier,
    store: &StateStore,
    target: &MonitorConfig,
) -> Transition {
    let result = probe.probe(target).await;
    let recorded = store.record(&result).await;
    dispatch_alert(notifier, &recorded.transition).await;
    recorded.transition
}

/// Send the alert a transition calls for. Returns true if an alert was delivered.
///
/// The dedup flag was already set by the transition, so a failed delivery is
/// logged and not retried.
pub async fn dispatch_alert(notifier: &dyn Notifier, transition: &Transition) -> bool {
    let Some(kind) = transition.alert else {
        return false;
    };
    let url = &transition.status.url;

    tracing::debug!("Dispatching {} alert for {}", kind, url);
    match notifier::send_alert(notifier, kind, &transition.status).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("{} alert for {} failed: {}", kind, url, e);
            false
        }
    }
}

async fn check_loop(
    target: CheckTarget,
    error_backoff: Duration,
    probe: Arc<dyn Probe>,
    notifier: Arc<dyn Notifier>,
    store: Arc<StateStore>,
    cancel: CancellationToken,
) {
    let backoff = error_backoff.max(target.interval.saturating_mul(2));
    let monitor = Arc::new(target.monitor);

    while !cancel.is_cancelled() {
        // Each iteration runs in its own task so a panic stays contained
        let mut iteration = AbortOnDrop({
            let probe = Arc::clone(&probe);
            let notifier = Arc::clone(&notifier);
            let store = Arc::clone(&store);
            let monitor = Arc::clone(&monitor);
            tokio::spawn(
                async move {
                    check_once(probe.as_ref(), notifier.as_ref(), &store, &monitor).await;
                }
                .in_current_span(),
            )
        });

        let pause = match (&mut iteration.0).await {
            Ok(()) => target.interval,
            Err(e) => {
                tracing::error!(
                    "Check of {} crashed, retrying in {:?}: {}",
                    monitor.url,
                    backoff,
                    e
                );
                backoff
            }
        };

        if !sleep_or_cancel(pause, &cancel).await {
            break;
        }
    }

    tracing::debug!("Check loop for {} cancelled", monitor.url);
}

async fn sweep_loop(
    store: Arc<StateStore>,
    retention: chrono::Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    while sleep_or_cancel(interval, &cancel).await {
        let evicted = store.evict_stale(retention, Utc::now()).await;
        if !evicted.is_empty() {
            tracing::info!("Sweep evicted {} stale URLs", evicted.len());
        }
    }
    tracing::debug!("Sweep loop cancelled");
}

async fn summary_loop(
    store: Arc<StateStore>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    cancel: CancellationToken,
) {
    while sleep_or_cancel(interval, &cancel).await {
        let statuses = store.snapshot().await;
        match notifier.send_summary(&statuses).await {
            Ok(()) => tracing::info!("Sent periodic summary for {} URLs", statuses.len()),
            Err(e) => tracing::warn!("Periodic summary failed: {}", e),
        }
    }
    tracing::debug!("Summary loop cancelled");
}

/// Aborts the wrapped task when dropped, so an aborted loop takes its
/// in-flight check with it
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Sleep for `duration` unless cancelled first. Returns false on cancellation.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}
