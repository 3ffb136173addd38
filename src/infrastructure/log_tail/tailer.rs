//! Following chain logs while they grow.

use anyhow::{Context, Result};
use backoff::ExponentialBackoffBuilder;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, trace};

use crate::domain::ports::StopSignal;

/// Follows a log file that another process is still appending to.
///
/// Only complete lines are returned; a trailing partial line is kept until
/// its newline arrives.
#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    reader: BufReader<File>,
    pending: String,
    poll_interval: Duration,
}

impl LogTailer {
    /// Open `path`, retrying with exponential backoff while it does not
    /// exist yet.
    ///
    /// # Arguments
    ///
    /// * `path` - Log file written by a chain
    /// * `poll_interval` - Delay before re-reading at end of file
    /// * `open_timeout` - Total time to wait for the file to appear
    pub async fn open(path: &Path, poll_interval: Duration, open_timeout: Duration) -> Result<Self> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(poll_interval.min(Duration::from_millis(500)))
            .with_max_interval(poll_interval.max(Duration::from_secs(5)))
            .with_max_elapsed_time(Some(open_timeout))
            .build();
        let file = backoff::future::retry(policy, || async {
            File::open(path).await.map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    trace!(path = %path.display(), "log not there yet");
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        })
        .await
        .with_context(|| format!("Failed to open log {}", path.display()))?;

        debug!(path = %path.display(), "Tailing log");
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            pending: String::new(),
            poll_interval,
        })
    }

    /// Followed file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next complete line without its line terminator.
    ///
    /// Waits for more data at end of file. Returns `None` once `stop` is
    /// raised, or once `writer_done` is raised and the file is exhausted.
    pub async fn next_line(
        &mut self,
        stop: &StopSignal,
        writer_done: &StopSignal,
    ) -> Result<Option<String>> {
        loop {
            if stop.is_raised() {
                return Ok(None);
            }
            // checked before reading so that nothing written before the
            // writer finished is missed
            let done = writer_done.is_raised();
            let read = self
                .reader
                .read_line(&mut self.pending)
                .await
                .with_context(|| format!("Failed to read {}", self.path.display()))?;

            if self.pending.ends_with('\n') {
                let line = self.pending.trim_end_matches(['\n', '\r']).to_string();
                self.pending.clear();
                return Ok(Some(line));
            }
            if read == 0 && done {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.pending)));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
