//! Autostop - online convergence monitoring for parallel MCMC chains
//!
//! Autostop watches the trace and tree logs of two or more chains while
//! they run and stops them once a configurable set of criteria agrees that
//! they sample the same distribution.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Samples, trees, configuration, errors and ports
//! - **Service Layer** (`services`): Distance cache, autocorrelation, burn-in,
//!   stopping criteria and the convergence session
//! - **Application Layer** (`application`): Watcher task, log producers and log merge
//! - **Infrastructure Layer** (`infrastructure`): Configuration, logging,
//!   log tailing and chain factories
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```
//! use autostop::domain::models::SessionConfig;
//! use autostop::domain::models::{PhyloTree, TaxonMap};
//! use autostop::services::{ConvergenceSession, RobinsonFoulds};
//!
//! let config = SessionConfig::default();
//! let mut session = ConvergenceSession::<PhyloTree>::new(2, &config, RobinsonFoulds).unwrap();
//! let taxa = TaxonMap::new();
//! for chain in 0..2 {
//!     session.ingest_scalar_row(chain, &[0.0, -10.0, -8.0, -2.0]).unwrap();
//!     session.ingest_tree(chain, PhyloTree::parse("((1,2),3);", &taxa).unwrap()).unwrap();
//! }
//! let outcome = session.tick(session.watermark()).unwrap();
//! assert_eq!(outcome.watermark, 1);
//! assert!(!outcome.converged);
//! ```

/// Watcher, producers and the end-to-end monitor
pub mod application;
/// Command-line interface
pub mod cli;
/// Data model, errors and ports
pub mod domain;
/// Adapters: configuration, logging, log tailing, chains
pub mod infrastructure;
/// Convergence diagnostics
pub mod services;

// Re-export commonly used types for convenience
pub use application::{ChainEvent, ConvergenceWatcher, Monitor};
pub use domain::models::{
    BurnInStrategy, Config, LoggingConfig, MonitorConfig, MonitorReport, PhyloTree, SessionConfig,
    TaxonMap, TickOutcome,
};
pub use domain::ports::{ChainFactory, ChainLayout, ChainSpec, StopSignal, Topology, TreeDistance};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ConvergenceSession, DistanceCache, RobinsonFoulds};
