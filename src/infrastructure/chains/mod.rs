//! Chain factory implementations.

/// Replay of recorded chain logs
pub mod emulated;

pub use emulated::EmulatedChainFactory;
