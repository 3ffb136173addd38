//! Domain errors for the convergence engine.

use thiserror::Error;

/// Configuration errors. Raised at setup time and never recovered from.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Fewer than two chains
    #[error("Invalid chain count: {0}. Must be at least 2")]
    InvalidChainCount(usize),

    /// A pairwise criterion with other than two chains
    #[error("{criterion} handles exactly 2 chains, not {actual}")]
    ChainCountMismatch {
        /// Criterion name
        criterion: &'static str,
        /// Configured chains
        actual: usize,
    },

    /// Non-positive or non-finite threshold
    #[error("Invalid threshold for {criterion}: {value}")]
    InvalidThreshold {
        /// Criterion name
        criterion: &'static str,
        /// Rejected value
        value: f64,
    },

    /// Smoothing outside `[0, 1)`
    #[error("smoothing should be in [0, 1), not {0}")]
    InvalidSmoothing(f64),

    /// Zero target ESS
    #[error("targetESS should be positive, not {0}")]
    InvalidTargetEss(usize),

    /// Cache limit not above the target ESS
    #[error("cacheLimit ({cache_limit}) should be larger than targetESS ({target_ess})")]
    CacheLimitTooSmall {
        /// Configured cache limit
        cache_limit: usize,
        /// Configured target ESS
        target_ess: usize,
    },

    /// Sample size outside `1..target_ess`
    #[error("sampleSize should be in 1..{target_ess}, not {sample_size}")]
    InvalidSampleSize {
        /// Configured sample size
        sample_size: usize,
        /// Configured target ESS
        target_ess: usize,
    },

    /// Fixed-fraction percentage above 99
    #[error("Burn-in percentage must be between 0 and 99, not {0}")]
    InvalidBurnInPercent(u32),

    /// Configured trace label missing from the log header
    #[error("Could not find label '{label}' in trace log. Use one of {available:?}")]
    UnknownTraceLabel {
        /// Missing label
        label: String,
        /// Labels of the header
        available: Vec<String>,
    },

    /// Trace criteria with no labels
    #[error("No trace labels configured")]
    EmptyTraceLabels,

    /// Unknown log level
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Unknown log format
    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// Zero poll interval
    #[error("Invalid poll interval: {0}ms. Must be at least 1")]
    InvalidPollInterval(u64),

    /// Zero channel capacity
    #[error("Invalid channel capacity: {0}. Must be at least 1")]
    InvalidChannelCapacity(usize),

    /// Figment extraction or other loader failure
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Misuse of the session API.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    /// Chain index past the chain count
    #[error("Chain index {index} out of range for {chain_count} chains")]
    ChainOutOfRange {
        /// Requested chain
        index: usize,
        /// Chains in the session
        chain_count: usize,
    },

    /// Tick requested past the shortest chain
    #[error("Watermark {requested} is ahead of ingested data ({available})")]
    WatermarkAhead {
        /// Requested watermark
        requested: usize,
        /// Samples every chain has
        available: usize,
    },

    /// Trace row width differs from the header
    #[error("Row for chain {chain} has {actual} columns, expected {expected}")]
    ColumnCountMismatch {
        /// Chain index
        chain: usize,
        /// Header width
        expected: usize,
        /// Row width
        actual: usize,
    },

    /// Invalid session configuration
    #[error("Session configuration rejected: {0}")]
    Config(#[from] ConfigError),
}

/// Faults inside a criterion evaluation. Caught at the criterion boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvaluationError {
    /// Tree window reaches past the ingested trees
    #[error("Tree {index} of chain {chain} has not been ingested")]
    MissingTree {
        /// Chain index
        chain: usize,
        /// Tree index
        index: usize,
    },

    /// Sample window reaches past the ingested rows
    #[error("Column {column} of chain {chain} has no sample {index}")]
    MissingSample {
        /// Chain index
        chain: usize,
        /// Column index
        column: usize,
        /// Sample index
        index: usize,
    },

    /// Statistic evaluated to NaN or infinity
    #[error("Non-finite statistic {name} = {value}")]
    NonFinite {
        /// Statistic name
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// Window with no samples
    #[error("Empty evaluation window [{start}, {end})")]
    EmptyWindow {
        /// Window start
        start: usize,
        /// Window end, exclusive
        end: usize,
    },
}

/// Newick parsing failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeParseError {
    /// Line lacks the `tree ... =` prefix
    #[error("Line is not a tree line: {0}")]
    NotATreeLine(String),

    /// Input ended inside a tree
    #[error("Unexpected end of Newick string at position {0}")]
    UnexpectedEnd(usize),

    /// Character not valid at this point
    #[error("Unexpected character '{found}' at position {position}")]
    UnexpectedChar {
        /// Character read
        found: char,
        /// Byte offset
        position: usize,
    },

    /// Tree without taxa
    #[error("Tree has no leaves")]
    Empty,
}

/// Result of a session operation.
pub type SessionResult<T> = Result<T, SessionError>;
/// Result of a criterion evaluation.
pub type EvaluationResult<T> = Result<T, EvaluationError>;
