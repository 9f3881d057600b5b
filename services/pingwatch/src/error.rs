//! Error types for the pingwatch service

/// Errors that can occur in the pingwatch service
#[derive(Debug, thiserror::Error)]
pub enum PingwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Request timeout after {0}s")]
    Timeout(u64),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Notifier error: {0}")]
    Notifier(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Result type alias for pingwatch operations
pub type Result<T> = std::result::Result<T, PingwatchError>;
