//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides
//! - Configuration validation
//! - Type-safe config structs

/// Layered YAML and environment loader
pub mod loader;

pub use crate::domain::errors::ConfigError;
pub use loader::ConfigLoader;
