//! Infrastructure layer module
//!
//! This module contains the adapters around the convergence engine:
//! - Configuration management
//! - Logging infrastructure
//! - Log tailing of chain output
//! - Chain factories
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

/// Chain factories
pub mod chains;
/// Figment configuration loading
pub mod config;
/// Reading and following chain logs
pub mod log_tail;
/// Tracing subscriber setup
pub mod logging;
