//! Domain layer for the convergence engine
//!
//! This module contains the data model, error taxonomy and the ports that
//! external collaborators (samplers, distance metrics) implement.

/// Error taxonomy
pub mod errors;
/// Data model and configuration
pub mod models;
/// Traits implemented outside the domain
pub mod ports;

// Re-export error types for convenient access
pub use errors::{ConfigError, EvaluationError, SessionError, TreeParseError};
