//! Application layer: the watcher task, the log producers feeding it and
//! the end-to-end monitor built from them.

/// Merging finished chain logs
pub mod log_merge;
/// End-to-end monitor
pub mod monitor;
/// Log producers
pub mod producer;
/// Session watcher task
pub mod watcher;

pub use log_merge::{merge_logs, MergedFile, MergedLogs};
pub use monitor::Monitor;
pub use producer::{ProducerSignals, TailSettings};
pub use watcher::{ChainEvent, ConvergenceWatcher, LogStream};
