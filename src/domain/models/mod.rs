//! Configuration, sample storage and report types.

/// Top-level configuration
pub mod config;
/// Criterion settings
pub mod criteria;
/// Tick and run reports
pub mod report;
/// Burn-in strategy selection
pub mod strategy;
/// Scalar trace storage
pub mod trace;
/// Phylogenetic trees and clades
pub mod tree;

pub use config::{Config, LoggingConfig, MonitorConfig, SessionConfig};
pub use criteria::{
    CladeDifferenceConfig, CriterionConfig, GelmanRubinConfig, PsrfForm, TraceEssConfig,
    TreeEssConfig, TreePsrfConfig, TreeWindowConfig,
};
pub use report::{CriterionStatus, MonitorReport, StopReason, TickOutcome};
pub use strategy::BurnInStrategy;
pub use trace::{DiagnosticColumns, ScalarTable};
pub use tree::{Clade, PhyloTree, TaxonMap, TreeNode};
