//! CLI command implementations.

/// `autostop burnin`
pub mod burnin;
/// `autostop check-trees`
pub mod check_trees;
/// `autostop emulate`
pub mod emulate;
/// `autostop monitor`
pub mod monitor;
