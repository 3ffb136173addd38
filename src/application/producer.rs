//! Per-chain producers turning tailed log lines into [`ChainEvent`]s.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::watcher::{ChainEvent, LogStream};
use crate::domain::models::config::MonitorConfig;
use crate::domain::models::tree::{PhyloTree, TaxonMap};
use crate::domain::ports::StopSignal;
use crate::infrastructure::log_tail::{parse_trace_line, parse_tree_line, LogTailer, TraceLine};

/// Timing of the log tailers.
#[derive(Debug, Clone, Copy)]
pub struct TailSettings {
    /// Pause between reads at end of file
    pub poll_interval: Duration,
    /// How long to wait for a log to appear
    pub open_timeout: Duration,
}

impl From<&MonitorConfig> for TailSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            open_timeout: Duration::from_secs(config.open_timeout_secs),
        }
    }
}

/// Signals shared by every producer of a run.
#[derive(Debug, Clone, Default)]
pub struct ProducerSignals {
    /// Raised by the watcher on convergence, or from outside.
    pub stop: StopSignal,
    /// Raised once the chains stopped writing.
    pub writer_done: StopSignal,
}

/// Spawn a task tailing the trace log of `chain`.
///
/// A failing producer raises the stop signal so that the whole run winds
/// down; its error is returned through the join handle.
pub fn spawn_trace_producer<T: Send + 'static>(
    chain: usize,
    path: PathBuf,
    events: mpsc::Sender<ChainEvent<T>>,
    signals: ProducerSignals,
    settings: TailSettings,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let result = tail_trace(chain, &path, &events, &signals, settings).await;
        finish(chain, LogStream::Trace, &events, &signals, result).await
    })
}

/// Spawn a task tailing the tree log of `chain`.
pub fn spawn_tree_producer(
    chain: usize,
    path: PathBuf,
    taxa: Arc<TaxonMap>,
    events: mpsc::Sender<ChainEvent<PhyloTree>>,
    signals: ProducerSignals,
    settings: TailSettings,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let result = tail_trees(chain, &path, &taxa, &events, &signals, settings).await;
        finish(chain, LogStream::Trees, &events, &signals, result).await
    })
}

async fn finish<T>(
    chain: usize,
    stream: LogStream,
    events: &mpsc::Sender<ChainEvent<T>>,
    signals: &ProducerSignals,
    result: Result<()>,
) -> Result<()> {
    if let Err(err) = &result {
        warn!(chain, stream = ?stream, error = %err, "Producer failed, stopping run");
        signals.stop.raise();
    }
    // the watcher may already be gone
    let _ = events.send(ChainEvent::Finished { chain, stream }).await;
    result
}

async fn tail_trace<T>(
    chain: usize,
    path: &std::path::Path,
    events: &mpsc::Sender<ChainEvent<T>>,
    signals: &ProducerSignals,
    settings: TailSettings,
) -> Result<()> {
    let mut tailer = LogTailer::open(path, settings.poll_interval, settings.open_timeout).await?;
    let mut rows = 0usize;
    while let Some(line) = tailer.next_line(&signals.stop, &signals.writer_done).await? {
        let event = match parse_trace_line(&line) {
            TraceLine::Header(labels) => ChainEvent::Header { chain, labels },
            TraceLine::Row(values) => {
                rows += 1;
                ChainEvent::Row { chain, values }
            }
            TraceLine::Skip => continue,
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
    debug!(chain, rows, path = %path.display(), "Trace producer done");
    Ok(())
}

async fn tail_trees(
    chain: usize,
    path: &std::path::Path,
    taxa: &TaxonMap,
    events: &mpsc::Sender<ChainEvent<PhyloTree>>,
    signals: &ProducerSignals,
    settings: TailSettings,
) -> Result<()> {
    let mut tailer = LogTailer::open(path, settings.poll_interval, settings.open_timeout).await?;
    let mut trees = 0usize;
    while let Some(line) = tailer.next_line(&signals.stop, &signals.writer_done).await? {
        let Some(tree_line) = parse_tree_line(&line) else {
            continue;
        };
        let tree = PhyloTree::parse(tree_line.newick, taxa).with_context(|| {
            format!(
                "Invalid tree STATE_{} in {}",
                tree_line.state,
                path.display()
            )
        })?;
        trees += 1;
        if events.send(ChainEvent::Tree { chain, tree }).await.is_err() {
            break;
        }
    }
    debug!(chain, trees, path = %path.display(), "Tree producer done");
    Ok(())
}
