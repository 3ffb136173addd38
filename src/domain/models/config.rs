//! Configuration tree loaded by the figment loader.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::criteria::{CriterionConfig, GelmanRubinConfig, TreePsrfConfig};
use super::strategy::BurnInStrategy;

/// Main configuration structure for autostop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Number of chains run in parallel
    #[serde(default = "default_chains")]
    pub chains: usize,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Convergence session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Log tailing configuration
    #[serde(default)]
    pub monitor: MonitorConfig,
}

const fn default_chains() -> usize {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            logging: LoggingConfig::default(),
            session: SessionConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            retention_days: default_retention_days(),
        }
    }
}

/// Convergence session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Burn-in estimation strategy
    #[serde(default)]
    pub burn_in: BurnInStrategy,

    /// Trace columns used for burn-in and trace criteria
    #[serde(default = "default_traces")]
    pub traces: Vec<String>,

    /// Stopping criteria evaluated on every tick
    #[serde(default = "default_criteria")]
    pub criteria: Vec<CriterionConfig>,

    /// Initial number of trees per chain the distance cache holds
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_traces() -> Vec<String> {
    vec![
        "posterior".to_string(),
        "likelihood".to_string(),
        "prior".to_string(),
    ]
}

fn default_criteria() -> Vec<CriterionConfig> {
    vec![
        CriterionConfig::GelmanRubin(GelmanRubinConfig::default()),
        CriterionConfig::TreePsrf(TreePsrfConfig::default()),
    ]
}

const fn default_cache_capacity() -> usize {
    1024
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            burn_in: BurnInStrategy::default(),
            traces: default_traces(),
            criteria: default_criteria(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl SessionConfig {
    /// Whether any criterion reads tree sequences.
    pub fn expects_trees(&self) -> bool {
        self.criteria.iter().any(CriterionConfig::needs_trees)
    }

    /// Whether scalar rows must be ingested, either for a criterion or for
    /// a burn-in strategy that reads trace values.
    pub fn expects_traces(&self) -> bool {
        self.criteria.iter().any(CriterionConfig::needs_traces)
            || !matches!(self.burn_in, BurnInStrategy::FixedFraction { .. })
    }
}

/// Log tailing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MonitorConfig {
    /// Trace log file name; chain `i` writes `chain{i}-{trace_log}`
    #[serde(default = "default_trace_log")]
    pub trace_log: String,

    /// Tree log file name; chain `i` writes `chain{i}-{tree_log}`
    #[serde(default = "default_tree_log")]
    pub tree_log: String,

    /// Directory holding the per-chain logs
    #[serde(default = "default_dir")]
    pub log_dir: PathBuf,

    /// Directory receiving the combined logs
    #[serde(default = "default_dir")]
    pub output_dir: PathBuf,

    /// Delay before retrying a log line that is not yet available
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Capacity of the producer to watcher channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Maximum time to wait for a chain's log file to appear
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,
}

fn default_trace_log() -> String {
    "trace.log".to_string()
}

fn default_tree_log() -> String {
    "trees.trees".to_string()
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

const fn default_channel_capacity() -> usize {
    1024
}

const fn default_open_timeout_secs() -> u64 {
    60
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            trace_log: default_trace_log(),
            tree_log: default_tree_log(),
            log_dir: default_dir(),
            output_dir: default_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            channel_capacity: default_channel_capacity(),
            open_timeout_secs: default_open_timeout_secs(),
        }
    }
}
