//! Settings of the tracing subscriber.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::errors::ConfigError;
use crate::domain::models::config::LoggingConfig;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Console output format (json, pretty)
    #[serde(default = "default_format")]
    pub format: LogFormat,

    /// Directory for log files (optional, if None logs only to the console)
    pub log_dir: Option<PathBuf>,

    /// Log rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,

    /// Log retention in days
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

/// Console output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Human-readable lines
    Pretty,
}

/// When the log file rolls over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// New file every day
    #[default]
    Daily,
    /// New file every hour
    Hourly,
    /// Single file
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            log_dir: None,
            rotation: RotationPolicy::default(),
            retention_days: default_retention_days(),
        }
    }
}

impl TryFrom<&LoggingConfig> for LogConfig {
    type Error = ConfigError;

    fn try_from(config: &LoggingConfig) -> Result<Self, Self::Error> {
        let format = match config.format.as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        };
        Ok(Self {
            level: config.level.clone(),
            format,
            log_dir: config.log_dir.clone(),
            rotation: RotationPolicy::Daily,
            retention_days: config.retention_days,
        })
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> LogFormat {
    LogFormat::Pretty
}

const fn default_retention_days() -> u32 {
    30
}
