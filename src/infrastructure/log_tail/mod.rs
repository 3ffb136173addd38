//! Reading chain logs: line classification for trace and tree logs and an
//! async tailer that follows files still being written.

/// Async follower of growing files
pub mod tailer;
/// Trace log format
pub mod trace_log;
/// Tree log format
pub mod tree_log;

pub use tailer::LogTailer;
pub use trace_log::{parse_trace_line, TraceLine, TraceLog};
pub use tree_log::{parse_tree_line, TreeLine, TreeLog};
