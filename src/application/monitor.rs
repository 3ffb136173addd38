//! End-to-end monitoring of a set of chains.

use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::producer::{spawn_trace_producer, spawn_tree_producer, ProducerSignals, TailSettings};
use super::watcher::{ChainEvent, ConvergenceWatcher};
use crate::domain::models::config::Config;
use crate::domain::models::report::{MonitorReport, TickOutcome};
use crate::domain::models::tree::{PhyloTree, TaxonMap};
use crate::domain::ports::{ChainFactory, ChainLayout, StopSignal};
use crate::services::robinson_foulds::RobinsonFoulds;
use crate::services::session::ConvergenceSession;

/// Runs chains (optionally), tails their logs and watches for convergence.
pub struct Monitor {
    config: Config,
    layout: ChainLayout,
    stop: StopSignal,
}

impl Monitor {
    /// Monitor the chains described by `config.monitor`.
    pub fn new(config: Config) -> Self {
        let layout = ChainLayout::new(
            &config.monitor.log_dir,
            config.monitor.trace_log.clone(),
            config.monitor.tree_log.clone(),
        );
        Self {
            config,
            layout,
            stop: StopSignal::new(),
        }
    }

    /// Where the chain logs live.
    pub fn layout(&self) -> &ChainLayout {
        &self.layout
    }

    /// Signal ending the run early when raised.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Monitor the chains until convergence or until they all finished
    ///
    /// # Arguments
    ///
    /// * `factory` - Starts the chains; `None` when they run elsewhere and
    ///   only their logs are tailed
    /// * `on_tick` - Called with every tick outcome
    pub async fn run<F>(&self, factory: Option<Arc<dyn ChainFactory>>, on_tick: F) -> Result<MonitorReport>
    where
        F: FnMut(&TickOutcome),
    {
        let chain_count = self.config.chains;
        let session_config = &self.config.session;
        let session = ConvergenceSession::<PhyloTree>::new(chain_count, session_config, RobinsonFoulds)
            .context("Failed to set up convergence session")?;

        let signals = ProducerSignals {
            stop: self.stop.clone(),
            writer_done: StopSignal::new(),
        };
        let chains = factory.map(|factory| self.spawn_chains(factory, signals.writer_done.clone()));

        let (tx, rx) = mpsc::channel::<ChainEvent<PhyloTree>>(self.config.monitor.channel_capacity);
        let settings = TailSettings::from(&self.config.monitor);
        let taxa = Arc::new(TaxonMap::new());
        let mut producers = Vec::new();
        for spec in self.layout.chains(chain_count) {
            if session_config.expects_traces() {
                producers.push(spawn_trace_producer(
                    spec.index,
                    spec.trace_path.clone(),
                    tx.clone(),
                    signals.clone(),
                    settings,
                ));
            }
            if session_config.expects_trees() {
                producers.push(spawn_tree_producer(
                    spec.index,
                    spec.tree_path.clone(),
                    Arc::clone(&taxa),
                    tx.clone(),
                    signals.clone(),
                    settings,
                ));
            }
        }
        drop(tx);

        let mut watcher = ConvergenceWatcher::new(session, self.stop.clone());
        let report = watcher.run(rx, on_tick).await;
        // chains still sampling have nothing left to contribute
        self.stop.raise();

        let mut failure = None;
        for result in join_all(producers).await {
            if let Err(err) = result.context("Producer task panicked").and_then(|inner| inner) {
                failure.get_or_insert(err);
            }
        }
        if let Some(chains) = chains {
            if let Err(err) = chains.await.context("Chain task panicked").and_then(|inner| inner) {
                failure.get_or_insert(err);
            }
        }
        let report = report?;
        if let Some(err) = failure {
            return Err(err.context("Monitoring failed"));
        }
        info!(reason = ?report.reason, ticks = report.ticks, "Monitoring finished");
        Ok(report)
    }

    fn spawn_chains(&self, factory: Arc<dyn ChainFactory>, writer_done: StopSignal) -> JoinHandle<Result<()>> {
        let specs = self.layout.chains(self.config.chains);
        let stop = self.stop.clone();
        tokio::spawn(async move {
            let runs = specs
                .into_iter()
                .map(|spec| {
                    let index = spec.index;
                    let factory = Arc::clone(&factory);
                    let stop = stop.clone();
                    async move {
                        factory
                            .run_chain(spec, stop)
                            .await
                            .with_context(|| format!("Chain {index} failed"))
                    }
                })
                .collect::<Vec<_>>();
            let results = join_all(runs).await;
            writer_done.raise();
            for result in &results {
                if let Err(err) = result {
                    warn!(error = %err, "Chain failed");
                }
            }
            results.into_iter().collect::<Result<Vec<_>>>().map(|_| ())
        })
    }
}
