//! Watcher task owning the convergence session.
//!
//! Producers send [`ChainEvent`]s over a bounded channel; the watcher is the
//! only mutator of the session. It ticks once for every watermark value all
//! chains have reached, in order, and raises the stop signal on
//! convergence.

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::SessionError;
use crate::domain::models::report::{MonitorReport, StopReason, TickOutcome};
use crate::domain::ports::{StopSignal, Topology};
use crate::services::session::ConvergenceSession;

/// Log stream of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    /// Scalar trace log.
    Trace,
    /// Tree log.
    Trees,
}

/// Data produced by a chain's log reader.
#[derive(Debug, Clone)]
pub enum ChainEvent<T> {
    /// Column labels of a trace log.
    Header {
        /// Chain index
        chain: usize,
        /// Labels in file order
        labels: Vec<String>,
    },
    /// One trace sample.
    Row {
        /// Chain index
        chain: usize,
        /// Values in header order
        values: Vec<f64>,
    },
    /// One sampled tree.
    Tree {
        /// Chain index
        chain: usize,
        /// Parsed topology
        tree: T,
    },
    /// A stream reached its end or was abandoned.
    Finished {
        /// Chain index
        chain: usize,
        /// Which log ended
        stream: LogStream,
    },
}

/// Single consumer of [`ChainEvent`]s driving a [`ConvergenceSession`].
pub struct ConvergenceWatcher<T> {
    session: ConvergenceSession<T>,
    stop: StopSignal,
    session_id: Uuid,
    ticked: usize,
    ticks: usize,
    last: Option<TickOutcome>,
}

impl<T: Topology> ConvergenceWatcher<T> {
    /// Watch `session`, raising `stop` once it converges.
    pub fn new(session: ConvergenceSession<T>, stop: StopSignal) -> Self {
        Self {
            session,
            stop,
            session_id: Uuid::new_v4(),
            ticked: 0,
            ticks: 0,
            last: None,
        }
    }

    /// Session being watched.
    pub fn session(&self) -> &ConvergenceSession<T> {
        &self.session
    }

    /// Identifier stamped on the final report.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Consume events until the session converges or every producer is done
    ///
    /// # Arguments
    ///
    /// * `events` - Receiving end of the producer channel
    /// * `on_tick` - Called with the outcome of every tick
    pub async fn run<F>(&mut self, mut events: mpsc::Receiver<ChainEvent<T>>, mut on_tick: F) -> Result<MonitorReport>
    where
        F: FnMut(&TickOutcome),
    {
        let started_at = Utc::now();
        info!(
            session_id = %self.session_id,
            chains = self.session.chain_count(),
            "Watching chains"
        );

        let reason = loop {
            let Some(event) = events.recv().await else {
                break if self.stop.is_raised() {
                    StopReason::Requested
                } else {
                    StopReason::ChainsFinished
                };
            };
            self.ingest(event)?;
            if self.advance(&mut on_tick)? {
                self.stop.raise();
                break StopReason::Converged;
            }
        };

        info!(
            session_id = %self.session_id,
            reason = ?reason,
            ticks = self.ticks,
            watermark = self.ticked,
            "Watcher finished"
        );
        Ok(MonitorReport {
            session_id: self.session_id,
            started_at,
            finished_at: Utc::now(),
            reason,
            ticks: self.ticks,
            last: self.last.clone(),
        })
    }

    fn ingest(&mut self, event: ChainEvent<T>) -> Result<()> {
        match event {
            ChainEvent::Header { chain, labels } => self
                .session
                .ingest_header(chain, &labels)
                .with_context(|| format!("Trace header of chain {chain} rejected"))?,
            ChainEvent::Row { chain, values } => match self.session.ingest_scalar_row(chain, &values) {
                Ok(()) => {}
                Err(err @ SessionError::ColumnCountMismatch { .. }) => {
                    warn!(chain, error = %err, "Skipping malformed trace row");
                }
                Err(err) => return Err(err).context("Failed to ingest trace row"),
            },
            ChainEvent::Tree { chain, tree } => self
                .session
                .ingest_tree(chain, tree)
                .context("Failed to ingest tree")?,
            ChainEvent::Finished { chain, stream } => {
                debug!(chain, stream = ?stream, "Log stream finished");
            }
        }
        Ok(())
    }

    /// Tick every watermark not evaluated yet. Returns true on convergence.
    fn advance<F>(&mut self, on_tick: &mut F) -> Result<bool>
    where
        F: FnMut(&TickOutcome),
    {
        let available = self.session.watermark();
        while self.ticked < available {
            self.ticked += 1;
            let outcome = self.session.tick(self.ticked)?;
            self.ticks += 1;
            on_tick(&outcome);
            let converged = outcome.converged;
            self.last = Some(outcome);
            if converged {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::SessionConfig;
    use crate::domain::models::criteria::{CriterionConfig, GelmanRubinConfig};
    use crate::domain::models::strategy::BurnInStrategy;
    use crate::services::criteria::test_support::{absolute, Point};

    fn session() -> ConvergenceSession<Point> {
        let config = SessionConfig {
            burn_in: BurnInStrategy::FixedFraction { percent: 10 },
            traces: vec!["posterior".to_string()],
            criteria: vec![CriterionConfig::GelmanRubin(GelmanRubinConfig::default())],
            cache_capacity: 16,
        };
        ConvergenceSession::new(2, &config, absolute).unwrap()
    }

    #[tokio::test]
    async fn test_converges_and_raises_stop() {
        let stop = StopSignal::new();
        let mut watcher = ConvergenceWatcher::new(session(), stop.clone());
        let (tx, rx) = mpsc::channel(16);
        let producer = tokio::spawn(async move {
            for i in 0..100 {
                for chain in 0..2 {
                    let row = ChainEvent::Row {
                        chain,
                        values: vec![f64::from(i), 1.0],
                    };
                    if tx.send(row).await.is_err() {
                        return i;
                    }
                }
            }
            100
        });

        let mut watermarks = Vec::new();
        let report = watcher
            .run(rx, |outcome| watermarks.push(outcome.watermark))
            .await
            .unwrap();
        assert_eq!(report.reason, StopReason::Converged);
        assert!(stop.is_raised());
        // constant chains converge as soon as 2 samples are available
        assert_eq!(watermarks, vec![1, 2]);
        assert_eq!(report.ticks, 2);
        assert!(producer.await.unwrap() < 100);
    }

    #[tokio::test]
    async fn test_chains_finished_without_convergence() {
        let stop = StopSignal::new();
        let mut watcher = ConvergenceWatcher::new(session(), stop.clone());
        let (tx, rx) = mpsc::channel(16);
        for i in 0..5 {
            tx.send(ChainEvent::Row {
                chain: 0,
                values: vec![f64::from(i), f64::from(i)],
            })
            .await
            .unwrap();
        }
        tx.send(ChainEvent::Finished {
            chain: 0,
            stream: LogStream::Trace,
        })
        .await
        .unwrap();
        drop(tx);

        let report = watcher.run(rx, |_| {}).await.unwrap();
        assert_eq!(report.reason, StopReason::ChainsFinished);
        assert_eq!(report.ticks, 0);
        assert!(report.last.is_none());
        assert_eq!(watcher.session().table(0).map(|t| t.len()), Some(5));
    }

    #[tokio::test]
    async fn test_malformed_row_is_skipped() {
        let mut watcher = ConvergenceWatcher::new(session(), StopSignal::new());
        let (tx, rx) = mpsc::channel(16);
        tx.send(ChainEvent::Row { chain: 0, values: vec![0.0, 1.0] }).await.unwrap();
        tx.send(ChainEvent::Row { chain: 0, values: vec![1.0] }).await.unwrap();
        drop(tx);
        watcher.run(rx, |_| {}).await.unwrap();
        assert_eq!(watcher.session().table(0).map(|t| t.len()), Some(1));
    }

    #[tokio::test]
    async fn test_unknown_header_label_fails() {
        let mut watcher = ConvergenceWatcher::new(session(), StopSignal::new());
        let (tx, rx) = mpsc::channel(4);
        tx.send(ChainEvent::Header {
            chain: 0,
            labels: vec!["Sample".to_string(), "joint".to_string()],
        })
        .await
        .unwrap();
        drop(tx);
        assert!(watcher.run(rx, |_| {}).await.is_err());
    }
}
