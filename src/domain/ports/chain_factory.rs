//! Port for launching the chains whose logs are monitored.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative stop flag shared between the watcher and the chains
///
/// Chains check it at every safe point (between two samples) and return
/// once it is raised.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    raised: Arc<AtomicBool>,
}

impl StopSignal {
    /// Lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal for every clone.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Whether any clone raised the signal.
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

/// Output locations of one chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSpec {
    /// Chain index
    pub index: usize,
    /// Trace log path
    pub trace_path: PathBuf,
    /// Tree log path
    pub tree_path: PathBuf,
}

/// Builds per-chain output paths as `chain{i}-{file}` inside one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLayout {
    dir: PathBuf,
    trace_log: String,
    tree_log: String,
}

impl ChainLayout {
    /// Layout with chain logs in `dir` named after `trace_log` and `tree_log`.
    pub fn new(dir: impl Into<PathBuf>, trace_log: impl Into<String>, tree_log: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            trace_log: trace_log.into(),
            tree_log: tree_log.into(),
        }
    }

    /// Directory holding every chain log.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Trace log file name, without the chain prefix.
    pub fn trace_log(&self) -> &str {
        &self.trace_log
    }

    /// Tree log file name, without the chain prefix.
    pub fn tree_log(&self) -> &str {
        &self.tree_log
    }

    /// Output paths of chain `index`
    pub fn chain(&self, index: usize) -> ChainSpec {
        ChainSpec {
            index,
            trace_path: self.dir.join(format!("chain{index}-{}", self.trace_log)),
            tree_path: self.dir.join(format!("chain{index}-{}", self.tree_log)),
        }
    }

    /// Specs of chains `0..count`
    pub fn chains(&self, count: usize) -> Vec<ChainSpec> {
        (0..count).map(|index| self.chain(index)).collect()
    }
}

/// Port for starting MCMC chains following hexagonal architecture
///
/// A factory runs one sampler per [`ChainSpec`]; each sampler writes its
/// trace and tree logs to the paths of its spec while the watcher tails them.
#[async_trait]
pub trait ChainFactory: Send + Sync {
    /// Run one chain to completion
    ///
    /// # Arguments
    ///
    /// * `spec` - Output locations of the chain
    /// * `stop` - Raised when the chains converged
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The chain finished or honoured the stop signal
    /// * `Err` - If the chain could not be run
    async fn run_chain(&self, spec: ChainSpec, stop: StopSignal) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_prefixes_chain_index() {
        let layout = ChainLayout::new("/tmp/run", "beast.log", "beast.trees");
        let spec = layout.chain(1);
        assert_eq!(spec.trace_path, PathBuf::from("/tmp/run/chain1-beast.log"));
        assert_eq!(spec.tree_path, PathBuf::from("/tmp/run/chain1-beast.trees"));
        assert_eq!(layout.chains(3).len(), 3);
    }

    #[test]
    fn test_stop_signal_is_shared() {
        let stop = StopSignal::new();
        let clone = stop.clone();
        assert!(!clone.is_raised());
        stop.raise();
        assert!(clone.is_raised());
    }
}
