//! Pingwatch CLI
//!
//! Command-line interface for the uptime monitoring and alerting service.

use std::path::{Path, PathBuf};

use clap::Parser;
use pingwatch::{load_config, PingwatchBuilder, PingwatchError};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

#[derive(Parser)]
#[command(name = "pingwatch")]
#[command(about = "Uptime monitoring and alerting service")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// State file (overrides config file)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Validate the configuration and test the SMTP connection, then exit
    #[arg(long)]
    validate_config: bool,

    /// Print the status of every known URL, then exit
    #[arg(long)]
    status: bool,

    /// Email a summary report now, then exit
    #[arg(long)]
    send_report: bool,

    /// Clear the alert flags of a URL, then exit
    #[arg(long, value_name = "URL")]
    reset_alerts: Option<String>,

    /// Console log level (overrides config file)
    #[arg(short, long)]
    log_level: Option<Level>,
}

/// Console logging at `level`, plus a log file that records debug and above
///
/// A log file that cannot be opened is reported and skipped. The returned
/// guard flushes the file writer when dropped.
fn init_tracing(level: Level, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let mut file_error = None;
    let (file_layer, guard) = match log_file.map(open_log_file) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            file_error = Some(e.to_string());
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(LevelFilter::from_level(level)))
        .with(file_layer)
        .init();

    if let (Some(path), Some(e)) = (log_file, file_error) {
        tracing::warn!("Could not open log file {:?}, logging to console only: {}", path, e);
    }
    guard
}

fn open_log_file(path: &Path) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let name = path.file_name().ok_or("log file path has no file name")?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)?;
    Ok(appender)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    let log_level = match args.log_level {
        Some(level) => level,
        None => config.log_level()?,
    };
    let _log_guard = init_tracing(log_level, config.log_file.as_deref());

    tracing::debug!(
        "Parsed command line arguments: config={:?}, state_file={:?}, log_level={:?}",
        args.config,
        args.state_file,
        log_level
    );

    config.resolve_secrets()?;

    if let Some(state_file) = args.state_file {
        config.state_file = state_file;
    }

    let pingwatch = PingwatchBuilder::new(config).build().await?;

    if args.validate_config {
        pingwatch.test_connection().await?;
        println!("Configuration is valid and the SMTP connection works");
        return Ok(());
    }

    if args.status {
        print!("{}", pingwatch.status_report().await);
        return Ok(());
    }

    if args.send_report {
        pingwatch.send_summary_now().await?;
        println!("Summary report sent");
        return Ok(());
    }

    if let Some(url) = args.reset_alerts {
        if !pingwatch.reset_alerts(&url).await {
            return Err(PingwatchError::Config(format!("No stored state for {}", url)).into());
        }
        println!("Alert flags reset for {}", url);
        return Ok(());
    }

    tracing::info!("Starting pingwatch service");
    pingwatch.start().await?;

    Ok(())
}
