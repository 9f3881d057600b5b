//! Configuration types for the pingwatch service

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use tracing::Level;

/// Upper bound for settings expressed in seconds (one year)
const MAX_SECONDS: u64 = 365 * 24 * 60 * 60;
/// Upper bound for settings expressed in hours (one year)
const MAX_HOURS: u64 = 365 * 24;
/// Upper bound for the retention window (one hundred years)
const MAX_RETENTION_DAYS: u64 = 36_500;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub monitors: Vec<MonitorConfig>,
    /// Default check interval for monitors that do not set their own
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Entries not checked for this many days are evicted by the sweep
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_hours: u64,
    #[serde(default = "default_error_backoff")]
    pub error_backoff_seconds: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    /// Periodic summary email; disabled when unset
    #[serde(default)]
    pub summary_interval_hours: Option<u64>,
    /// Console log level; `--log-level` on the command line wins
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log file receiving every message at debug and above; null disables it
    #[serde(default = "default_log_file")]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            email: EmailConfig::default(),
            monitors: Vec::new(),
            check_interval_seconds: default_check_interval(),
            state_file: default_state_file(),
            retention_days: default_retention_days(),
            cleanup_interval_hours: default_cleanup_interval(),
            error_backoff_seconds: default_error_backoff(),
            shutdown_grace_seconds: default_shutdown_grace(),
            summary_interval_hours: None,
            log_level: default_log_level(),
            log_file: default_log_file(),
        }
    }
}

/// SMTP settings for alert delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Name of an environment variable holding the SMTP password
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub from_email: String,
    #[serde(default)]
    pub to_emails: Vec<String>,
    #[serde(default = "default_true")]
    pub use_tls: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_server: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            password_env: None,
            from_email: String::new(),
            to_emails: Vec::new(),
            use_tls: default_true(),
        }
    }
}

/// A single monitored URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub check_interval_seconds: Option<u64>,
    #[serde(default = "default_expected_status_codes")]
    pub expected_status_codes: Vec<u16>,
}

impl MonitorConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_seconds: default_timeout(),
            check_interval_seconds: None,
            expected_status_codes: default_expected_status_codes(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Config {
    /// Check interval for a monitor, falling back to the global default
    pub fn check_interval_for(&self, monitor: &MonitorConfig) -> Duration {
        Duration::from_secs(
            monitor
                .check_interval_seconds
                .unwrap_or(self.check_interval_seconds),
        )
    }

    /// Retention window, saturating at the largest representable span
    pub fn retention(&self) -> TimeDelta {
        i64::try_from(self.retention_days)
            .ok()
            .and_then(TimeDelta::try_days)
            .unwrap_or(TimeDelta::MAX)
    }

    pub fn cleanup_interval(&self) -> Duration {
        hours(self.cleanup_interval_hours)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    pub fn summary_interval(&self) -> Option<Duration> {
        self.summary_interval_hours.map(hours)
    }

    /// Console log level. WARNING and CRITICAL are accepted as aliases.
    pub fn log_level(&self) -> crate::Result<Level> {
        match self.log_level.to_ascii_uppercase().as_str() {
            "WARNING" => Ok(Level::WARN),
            "CRITICAL" => Ok(Level::ERROR),
            other => other
                .parse()
                .map_err(|_| config_error(format!("Unknown log level {:?}", self.log_level))),
        }
    }

    /// Fill secrets that are referenced indirectly through the environment
    pub fn resolve_secrets(&mut self) -> crate::Result<()> {
        if let Some(var) = &self.email.password_env {
            let password = std::env::var(var).map_err(|_| {
                crate::PingwatchError::Config(format!(
                    "Environment variable {} for the SMTP password is not set",
                    var
                ))
            })?;
            self.email.password = password;
        }
        Ok(())
    }

    /// Validate required fields and logical consistency
    pub fn validate(&self) -> crate::Result<()> {
        let email = &self.email;
        if email.smtp_server.is_empty() {
            return Err(config_error("Email SMTP server is required"));
        }
        if email.username.is_empty() {
            return Err(config_error("Email username is required"));
        }
        if email.password.is_empty() {
            return Err(config_error("Email password is required"));
        }
        if email.from_email.is_empty() {
            return Err(config_error("From email address is required"));
        }
        if email.to_emails.is_empty() {
            return Err(config_error("At least one recipient email is required"));
        }

        if self.monitors.is_empty() {
            return Err(config_error(
                "At least one monitor configuration is required",
            ));
        }
        if self.check_interval_seconds == 0 {
            return Err(config_error("Global check interval must be positive"));
        }
        if self.retention_days == 0 {
            return Err(config_error("Retention window must be positive"));
        }
        if self.cleanup_interval_hours == 0 {
            return Err(config_error("Cleanup interval must be positive"));
        }
        if self.summary_interval_hours == Some(0) {
            return Err(config_error("Summary interval must be positive"));
        }
        if self.check_interval_seconds > MAX_SECONDS {
            return Err(config_error(format!(
                "Global check interval must be at most {} seconds",
                MAX_SECONDS
            )));
        }
        if self.retention_days > MAX_RETENTION_DAYS {
            return Err(config_error(format!(
                "Retention window must be at most {} days",
                MAX_RETENTION_DAYS
            )));
        }
        if self.cleanup_interval_hours > MAX_HOURS {
            return Err(config_error(format!(
                "Cleanup interval must be at most {} hours",
                MAX_HOURS
            )));
        }
        if self.summary_interval_hours.is_some_and(|h| h > MAX_HOURS) {
            return Err(config_error(format!(
                "Summary interval must be at most {} hours",
                MAX_HOURS
            )));
        }
        if self.error_backoff_seconds > MAX_SECONDS {
            return Err(config_error(format!(
                "Error backoff must be at most {} seconds",
                MAX_SECONDS
            )));
        }
        if self.shutdown_grace_seconds > MAX_SECONDS {
            return Err(config_error(format!(
                "Shutdown grace period must be at most {} seconds",
                MAX_SECONDS
            )));
        }
        self.log_level()?;

        let mut seen = HashSet::new();
        for (i, monitor) in self.monitors.iter().enumerate() {
            if monitor.url.is_empty() {
                return Err(config_error(format!("Monitor {}: URL is required", i)));
            }
            if !monitor.url.starts_with("http://") && !monitor.url.starts_with("https://") {
                return Err(config_error(format!(
                    "Monitor {}: URL must start with http:// or https://",
                    i
                )));
            }
            if monitor.timeout_seconds == 0 {
                return Err(config_error(format!(
                    "Monitor {}: Timeout must be positive",
                    i
                )));
            }
            if monitor.timeout_seconds > MAX_SECONDS {
                return Err(config_error(format!(
                    "Monitor {}: Timeout must be at most {} seconds",
                    i, MAX_SECONDS
                )));
            }
            if monitor.check_interval_seconds == Some(0) {
                return Err(config_error(format!(
                    "Monitor {}: Check interval must be positive",
                    i
                )));
            }
            if monitor
                .check_interval_seconds
                .is_some_and(|secs| secs > MAX_SECONDS)
            {
                return Err(config_error(format!(
                    "Monitor {}: Check interval must be at most {} seconds",
                    i, MAX_SECONDS
                )));
            }
            if monitor.expected_status_codes.is_empty() {
                return Err(config_error(format!(
                    "Monitor {}: At least one expected status code is required",
                    i
                )));
            }
            if !seen.insert(monitor.url.as_str()) {
                return Err(config_error(format!(
                    "Monitor {}: Duplicate URL {}",
                    i, monitor.url
                )));
            }
        }

        Ok(())
    }
}

fn config_error(msg: impl Into<String>) -> crate::PingwatchError {
    crate::PingwatchError::Config(msg.into())
}

fn hours(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(60 * 60))
}

fn default_check_interval() -> u64 {
    300
}

fn default_state_file() -> PathBuf {
    PathBuf::from("logs/pingwatch_state.json")
}

fn default_retention_days() -> u64 {
    30
}

fn default_cleanup_interval() -> u64 {
    6
}

fn default_error_backoff() -> u64 {
    60
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("logs/pingwatch.log"))
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_expected_status_codes() -> Vec<u16> {
    vec![200, 201, 202, 204]
}

/// Load configuration from a YAML (or JSON) file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::PingwatchError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_yaml::from_str(&content)?;
    Ok(config)
}
