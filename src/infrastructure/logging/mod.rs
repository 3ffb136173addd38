//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output
//! - Rolling log files with retention cleanup

/// Logging settings
pub mod config;
/// Subscriber initialization and log retention
pub mod logger;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::{prune_old_logs, LoggerImpl};
