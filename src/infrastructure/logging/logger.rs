//! Tracing subscriber with console and rolling file output.

use super::config::{LogConfig, LogFormat, RotationPolicy};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Prefix of the rolling log files.
const LOG_FILE_PREFIX: &str = "autostop.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logger implementation using tracing
pub struct LoggerImpl {
    _guard: Option<WorkerGuard>,
}

impl LoggerImpl {
    /// Initialize the global subscriber
    ///
    /// Console output goes to stderr so that command results on stdout stay
    /// machine readable. With a log directory, a JSON file layer is added
    /// and files older than the retention period are removed first.
    ///
    /// # Errors
    /// Returns an error if the level is invalid or a global subscriber is
    /// already installed
    pub fn init(config: &LogConfig) -> Result<Self> {
        let default_level = parse_log_level(&config.level)?;
        let env_filter = || {
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy()
        };

        let console: BoxedLayer = match config.format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true)
                .with_target(true)
                .with_filter(env_filter())
                .boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(env_filter())
                .boxed(),
        };
        let mut layers = vec![console];

        let guard = if let Some(ref log_dir) = config.log_dir {
            std::fs::create_dir_all(log_dir)
                .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
            let removed = prune_old_logs(log_dir, config.retention_days)?;

            let file_appender = match config.rotation {
                RotationPolicy::Daily => rolling::daily(log_dir, LOG_FILE_PREFIX),
                RotationPolicy::Hourly => rolling::hourly(log_dir, LOG_FILE_PREFIX),
                RotationPolicy::Never => rolling::never(log_dir, LOG_FILE_PREFIX),
            };
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

            // File layer - always JSON for structured logging
            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking_file)
                    .with_ansi(false)
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_filter(env_filter())
                    .boxed(),
            );
            Some((guard, removed))
        } else {
            None
        };

        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .context("Failed to install tracing subscriber")?;

        tracing::info!(
            level = %config.level,
            format = ?config.format,
            file_output = config.log_dir.is_some(),
            pruned = guard.as_ref().map_or(0, |(_, removed)| *removed),
            "logger initialized"
        );

        Ok(Self {
            _guard: guard.map(|(guard, _)| guard),
        })
    }
}

/// Remove rolling log files older than `retention_days`
///
/// Only files whose name starts with the log prefix are considered.
///
/// # Returns
/// Number of removed files
pub fn prune_old_logs(log_dir: &Path, retention_days: u32) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }
    let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
    let mut removed = 0;
    let entries = std::fs::read_dir(log_dir)
        .with_context(|| format!("Failed to read log directory {}", log_dir.display()))?;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if !is_log || !path.is_file() {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|metadata| metadata.modified()) else {
            continue;
        };
        let modified: DateTime<Utc> = modified.into();
        if modified < cutoff {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove old log {}", path.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Parse log level string to Level
fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {level}"),
    }
}
