//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces the convergence engine depends on:
//! - Topology: Clade view of a tree value
//! - TreeDistance: Black-box distance between two trees
//! - ChainFactory: Starts the samplers whose logs are monitored
//!
//! These traits keep the session and criteria independent of any concrete
//! sampler or tree metric.

/// Starting samplers and locating their logs
pub mod chain_factory;
/// Tree metrics and clade views
pub mod tree_distance;

pub use chain_factory::{ChainFactory, ChainLayout, ChainSpec, StopSignal};
pub use tree_distance::{Topology, TreeDistance};
