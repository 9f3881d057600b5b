//! Pingwatch - uptime monitoring and alerting service
//!
//! Periodically probes HTTP endpoints, tracks each URL through an
//! UNKNOWN / UP / DOWN state machine, and emails exactly one alert per
//! downtime episode plus one recovery notice when it ends.

pub mod config;
pub mod email;
pub mod error;
pub mod io;
pub mod notifier;
pub mod persistence;
pub mod probe;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod transition;

pub use config::{load_config, Config, EmailConfig, MonitorConfig};
pub use error::{PingwatchError, Result};
pub use status::{UrlState, UrlStatus};
pub use store::{StateStore, StatusSummary};
pub use transition::{update, AlertKind, Transition};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::email::EmailNotifier;
use crate::io::{HttpClient, MailTransport, ReqwestHttpClient, SmtpMailTransport};
use crate::notifier::Notifier;
use crate::persistence::{JsonFilePersistence, StatePersistence};
use crate::probe::{HttpProbe, Probe};
use crate::scheduler::Scheduler;

/// Builder for the pingwatch service.
///
/// Every collaborator can be injected; anything left unset is built from the
/// configuration when [`PingwatchBuilder::build`] runs.
pub struct PingwatchBuilder {
    config: Config,
    http: Option<Arc<dyn HttpClient>>,
    mail: Option<Arc<dyn MailTransport>>,
    probe: Option<Arc<dyn Probe>>,
    notifier: Option<Arc<dyn Notifier>>,
    persistence: Option<Arc<dyn StatePersistence>>,
    cancel: Option<CancellationToken>,
}

impl PingwatchBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: None,
            mail: None,
            probe: None,
            notifier: None,
            persistence: None,
            cancel: None,
        }
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_mail_transport(mut self, mail: Arc<dyn MailTransport>) -> Self {
        self.mail = Some(mail);
        self
    }

    /// Replaces the HTTP probe; takes precedence over `with_http_client`
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Replaces the email notifier; takes precedence over `with_mail_transport`
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn StatePersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Validate the configuration, wire up collaborators and load stored state
    pub async fn build(self) -> Result<Pingwatch> {
        self.config.validate()?;

        let probe: Arc<dyn Probe> = match self.probe {
            Some(probe) => probe,
            None => {
                let http: Arc<dyn HttpClient> = match self.http {
                    Some(http) => http,
                    None => Arc::new(ReqwestHttpClient::new()?),
                };
                Arc::new(HttpProbe::new(http))
            }
        };

        let notifier: Arc<dyn Notifier> = match self.notifier {
            Some(notifier) => notifier,
            None => {
                let mail: Arc<dyn MailTransport> = match self.mail {
                    Some(mail) => mail,
                    None => Arc::new(SmtpMailTransport::new(&self.config.email)?),
                };
                Arc::new(EmailNotifier::new(&self.config.email, mail))
            }
        };

        let persistence: Arc<dyn StatePersistence> = match self.persistence {
            Some(persistence) => persistence,
            None => Arc::new(JsonFilePersistence::new(self.config.state_file.clone())),
        };

        let store = Arc::new(StateStore::open(persistence).await);
        tracing::debug!(
            "Built pingwatch with {} monitors and {} stored statuses",
            self.config.monitors.len(),
            store.len().await
        );

        Ok(Pingwatch {
            config: self.config,
            probe,
            notifier,
            store,
            cancel: self.cancel.unwrap_or_else(CancellationToken::new),
        })
    }
}

/// A fully wired pingwatch service
pub struct Pingwatch {
    config: Config,
    probe: Arc<dyn Probe>,
    notifier: Arc<dyn Notifier>,
    store: Arc<StateStore>,
    cancel: CancellationToken,
}

impl Pingwatch {
    /// Monitor until Ctrl-C, SIGTERM or cancellation of the injected token
    pub async fn start(self) -> Result<()> {
        if let Err(e) = self.notifier.test_connection().await {
            tracing::warn!("Alert delivery test failed, monitoring anyway: {}", e);
        }

        let cancel_for_signal = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_signal() => {
                    tracing::info!("Shutdown signal received");
                    cancel_for_signal.cancel();
                }
                _ = cancel_for_signal.cancelled() => {}
            }
        });

        tracing::info!(
            "Pingwatch started, monitoring {} URLs",
            self.config.monitors.len()
        );

        Scheduler::from_config(
            &self.config,
            Arc::clone(&self.probe),
            Arc::clone(&self.notifier),
            Arc::clone(&self.store),
            self.cancel.clone(),
        )
        .run()
        .await;

        tracing::info!("Pingwatch stopped");
        Ok(())
    }

    /// Human readable status of every known URL
    pub async fn status_report(&self) -> String {
        store::render_status_report(&self.store.snapshot().await)
    }

    /// Send a summary of every known URL right away
    pub async fn send_summary_now(&self) -> Result<()> {
        let statuses = self.store.snapshot().await;
        self.notifier.send_summary(&statuses).await?;
        tracing::info!("Sent summary report for {} URLs", statuses.len());
        Ok(())
    }

    /// Clear the alert flags of one URL. Returns false if the URL is unknown.
    pub async fn reset_alerts(&self, url: &str) -> bool {
        self.store.reset_alerts(url).await
    }

    pub async fn test_connection(&self) -> Result<()> {
        self.notifier.test_connection().await
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
