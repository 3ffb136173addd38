//! Chains that replay recorded logs instead of sampling.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::domain::ports::{ChainFactory, ChainLayout, ChainSpec, StopSignal};
use crate::infrastructure::log_tail::{parse_trace_line, parse_tree_line, TraceLine};

/// Replays the logs of a finished run, one sample per `pace`.
///
/// Chain `i` reads the recorded files of `source.chain(i)` and writes them
/// line by line to the paths of its [`ChainSpec`]. Each step writes one trace
/// row and one tree, with the surrounding non-sample lines passed through
/// as they come.
#[derive(Debug, Clone)]
pub struct EmulatedChainFactory {
    source: ChainLayout,
    pace: Duration,
}

impl EmulatedChainFactory {
    /// Replay logs found under `source`, one step every `pace`.
    pub fn new(source: ChainLayout, pace: Duration) -> Self {
        Self { source, pace }
    }
}

/// Lines of a recorded log and the position of the next one to write.
struct Recording {
    lines: Vec<String>,
    next: usize,
    writer: Option<BufWriter<File>>,
}

impl Recording {
    async fn open(source: &Path, target: &Path) -> Result<Self> {
        let lines = match tokio::fs::read_to_string(source).await {
            Ok(text) => text.lines().map(ToString::to_string).collect(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %source.display(), "No recording, stream skipped");
                return Ok(Self {
                    lines: Vec::new(),
                    next: 0,
                    writer: None,
                });
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read {}", source.display()))
            }
        };
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = File::create(target)
            .await
            .with_context(|| format!("Failed to create {}", target.display()))?;
        Ok(Self {
            lines,
            next: 0,
            writer: Some(BufWriter::new(file)),
        })
    }

    fn is_finished(&self) -> bool {
        self.next >= self.lines.len()
    }

    /// Write lines up to and including the next one `is_sample` accepts.
    async fn advance(&mut self, is_sample: impl Fn(&str) -> bool) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        while let Some(line) = self.lines.get(self.next) {
            self.next += 1;
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            if is_sample(line) {
                break;
            }
        }
        writer.flush().await?;
        Ok(())
    }
}

fn is_trace_row(line: &str) -> bool {
    matches!(parse_trace_line(line), TraceLine::Row(_))
}

fn is_tree(line: &str) -> bool {
    parse_tree_line(line).is_some()
}

#[async_trait]
impl ChainFactory for EmulatedChainFactory {
    async fn run_chain(&self, spec: ChainSpec, stop: StopSignal) -> Result<()> {
        let recorded = self.source.chain(spec.index);
        let mut trace = Recording::open(&recorded.trace_path, &spec.trace_path).await?;
        let mut trees = Recording::open(&recorded.tree_path, &spec.tree_path).await?;

        let mut samples = 0usize;
        while !(trace.is_finished() && trees.is_finished()) {
            if stop.is_raised() {
                info!(chain = spec.index, samples, "Emulated chain stopped");
                return Ok(());
            }
            trace.advance(is_trace_row).await?;
            trees.advance(is_tree).await?;
            samples += 1;
            tokio::time::sleep(self.pace).await;
        }
        info!(chain = spec.index, samples, "Emulated chain finished");
        Ok(())
    }
}
