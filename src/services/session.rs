//! Convergence session: the root of the diagnostics engine.
//!
//! The session owns every chain's scalar table and tree sequence, the
//! shared distance cache and the registered criteria. Producers feed it
//! through the `ingest_*` methods; the watcher calls [`ConvergenceSession::tick`]
//! once per watermark.

use tracing::{debug, info};

use crate::domain::errors::{ConfigError, SessionError, SessionResult};
use crate::domain::models::config::SessionConfig;
use crate::domain::models::criteria::CriterionConfig;
use crate::domain::models::report::{CriterionStatus, TickOutcome};
use crate::domain::models::strategy::BurnInStrategy;
use crate::domain::models::trace::{DiagnosticColumns, ScalarTable};
use crate::domain::ports::{Topology, TreeDistance};
use crate::services::burn_in::BurnInEstimator;
use crate::services::criteria::{ConvergenceCheck, ConvergenceCriterion, EvaluationContext};
use crate::services::distance_cache::DistanceCache;

/// Samples and criteria of one multi-chain run.
///
/// `T` is the tree value type; sessions without tree criteria never see one.
pub struct ConvergenceSession<T> {
    chain_count: usize,
    trace_names: Vec<String>,
    columns: DiagnosticColumns,
    tables: Vec<ScalarTable>,
    trees: Vec<Vec<T>>,
    cache: DistanceCache,
    distance: Box<dyn TreeDistance<T>>,
    burn_in: BurnInEstimator,
    criteria: Vec<ConvergenceCriterion>,
    expects_traces: bool,
    expects_trees: bool,
}

impl<T: Topology> ConvergenceSession<T> {
    /// Create a session for `chain_count` chains and register the criteria
    /// of `config`.
    pub fn new<D>(chain_count: usize, config: &SessionConfig, distance: D) -> SessionResult<Self>
    where
        D: TreeDistance<T> + 'static,
    {
        if chain_count < 2 {
            return Err(ConfigError::InvalidChainCount(chain_count).into());
        }
        config.burn_in.validate()?;
        let columns = DiagnosticColumns::resolve(&config.traces, None)?;
        let mut session = Self {
            chain_count,
            trace_names: config.traces.clone(),
            columns,
            tables: vec![ScalarTable::new(); chain_count],
            trees: (0..chain_count).map(|_| Vec::new()).collect(),
            cache: DistanceCache::new(config.cache_capacity),
            distance: Box::new(distance),
            burn_in: BurnInEstimator::new(config.burn_in, chain_count),
            criteria: Vec::new(),
            expects_traces: !matches!(config.burn_in, BurnInStrategy::FixedFraction { .. }),
            expects_trees: false,
        };
        for criterion in &config.criteria {
            session.register_criterion(criterion)?;
        }
        Ok(session)
    }

    /// Number of chains.
    pub fn chain_count(&self) -> usize {
        self.chain_count
    }

    /// Diagnostic columns, resolved against the first header once one arrives.
    pub fn columns(&self) -> &DiagnosticColumns {
        &self.columns
    }

    /// Scalar samples of `chain`.
    pub fn table(&self, chain: usize) -> Option<&ScalarTable> {
        self.tables.get(chain)
    }

    /// Trees of `chain`.
    pub fn trees(&self, chain: usize) -> Option<&[T]> {
        self.trees.get(chain).map(Vec::as_slice)
    }

    /// Registered criteria, in registration order.
    pub fn criteria(&self) -> &[ConvergenceCriterion] {
        &self.criteria
    }

    /// Active burn-in strategy.
    pub fn burnin_strategy(&self) -> BurnInStrategy {
        self.burn_in.strategy()
    }

    fn check_chain(&self, chain: usize) -> SessionResult<()> {
        if chain >= self.chain_count {
            return Err(SessionError::ChainOutOfRange {
                index: chain,
                chain_count: self.chain_count,
            });
        }
        Ok(())
    }

    /// Column labels of a trace log header. Diagnostic columns are resolved
    /// against the labels of the first chain that reports them.
    pub fn ingest_header(&mut self, chain: usize, labels: &[String]) -> SessionResult<()> {
        self.check_chain(chain)?;
        self.columns = DiagnosticColumns::resolve(&self.trace_names, Some(labels))?;
        debug!(chain, columns = ?self.columns.indices(), "Resolved trace columns");
        Ok(())
    }

    /// Append one trace row to `chain`.
    ///
    /// # Arguments
    ///
    /// * `chain` - Chain index
    /// * `row` - Values in header order, sample number first
    pub fn ingest_scalar_row(&mut self, chain: usize, row: &[f64]) -> SessionResult<()> {
        self.check_chain(chain)?;
        self.tables[chain]
            .push_row(row)
            .map_err(|expected| SessionError::ColumnCountMismatch {
                chain,
                expected,
                actual: row.len(),
            })
    }

    /// Append one tree to `chain`.
    pub fn ingest_tree(&mut self, chain: usize, tree: T) -> SessionResult<()> {
        self.check_chain(chain)?;
        self.trees[chain].push(tree);
        Ok(())
    }

    /// Switch the burn-in strategy; burn-in floors start over.
    pub fn set_burnin_strategy(&mut self, strategy: BurnInStrategy) -> SessionResult<()> {
        strategy.validate()?;
        self.burn_in.set_strategy(strategy);
        if !matches!(strategy, BurnInStrategy::FixedFraction { .. }) {
            self.expects_traces = true;
        }
        Ok(())
    }

    /// Validate and add a criterion for subsequent ticks.
    pub fn register_criterion(&mut self, config: &CriterionConfig) -> SessionResult<()> {
        config.validate(self.chain_count)?;
        let mut criterion = ConvergenceCriterion::from_config(config);
        criterion.setup(self.chain_count, &self.columns)?;
        self.expects_traces |= config.needs_traces();
        self.expects_trees |= config.needs_trees();
        self.criteria.push(criterion);
        Ok(())
    }

    /// Number of samples every chain has delivered on every expected stream.
    pub fn watermark(&self) -> usize {
        let rows = self.tables.iter().map(ScalarTable::len).min().unwrap_or(0);
        let trees = self.trees.iter().map(Vec::len).min().unwrap_or(0);
        match (self.expects_traces, self.expects_trees) {
            (true, true) => rows.min(trees),
            (false, true) => trees,
            _ => rows,
        }
    }

    /// Estimate burn-ins and evaluate all criteria at `watermark`.
    pub fn tick(&mut self, watermark: usize) -> SessionResult<TickOutcome> {
        let available = self.watermark();
        if watermark > available {
            return Err(SessionError::WatermarkAhead {
                requested: watermark,
                available,
            });
        }

        let mut burnin = Vec::with_capacity(self.chain_count);
        for (chain, table) in self.tables.iter().enumerate() {
            let columns: Vec<&[f64]> = self
                .columns
                .indices()
                .iter()
                .filter_map(|&index| table.column(index))
                .collect();
            let estimate = self.burn_in.chain_burnin(chain, &columns, watermark);
            burnin.push(estimate.min(watermark));
        }

        let mut ctx = EvaluationContext {
            tables: &self.tables,
            columns: &self.columns,
            trees: &self.trees,
            cache: &mut self.cache,
            distance: self.distance.as_ref(),
            burnin: &burnin,
            end: watermark,
        };
        let mut statuses = Vec::with_capacity(self.criteria.len());
        for criterion in &mut self.criteria {
            let converged = criterion.converged(&mut ctx);
            statuses.push(CriterionStatus {
                header: criterion.header().to_string(),
                converged,
                values: criterion.log_values(),
            });
        }
        let converged = !statuses.is_empty() && statuses.iter().all(|status| status.converged);

        if converged {
            info!(watermark, burnin = ?burnin, "All criteria converged");
        } else {
            debug!(watermark, burnin = ?burnin, "Not converged");
        }
        Ok(TickOutcome {
            watermark,
            burnin,
            converged,
            criteria: statuses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::criteria::{GelmanRubinConfig, TreePsrfConfig};
    use crate::services::criteria::test_support::{absolute, Point};

    fn trace_config() -> SessionConfig {
        SessionConfig {
            burn_in: BurnInStrategy::FixedFraction { percent: 10 },
            traces: vec!["posterior".to_string()],
            criteria: vec![CriterionConfig::GelmanRubin(GelmanRubinConfig::default())],
            cache_capacity: 16,
        }
    }

    #[test]
    fn test_rejects_single_chain() {
        let result = ConvergenceSession::<Point>::new(1, &trace_config(), absolute);
        assert!(matches!(
            result,
            Err(SessionError::Config(ConfigError::InvalidChainCount(1)))
        ));
    }

    #[test]
    fn test_tree_criterion_rejects_three_chains() {
        let mut config = trace_config();
        config.criteria = vec![CriterionConfig::TreePsrf(TreePsrfConfig::default())];
        let result = ConvergenceSession::<Point>::new(3, &config, absolute);
        assert!(matches!(
            result,
            Err(SessionError::Config(ConfigError::ChainCountMismatch { actual: 3, .. }))
        ));
    }

    #[test]
    fn test_ingest_validates_chain_and_width() {
        let mut session = ConvergenceSession::<Point>::new(2, &trace_config(), absolute).unwrap();
        assert_eq!(
            session.ingest_scalar_row(2, &[0.0, 1.0]),
            Err(SessionError::ChainOutOfRange {
                index: 2,
                chain_count: 2
            })
        );
        session.ingest_scalar_row(0, &[0.0, 1.0]).unwrap();
        assert_eq!(
            session.ingest_scalar_row(0, &[1.0, 1.0, 1.0]),
            Err(SessionError::ColumnCountMismatch {
                chain: 0,
                expected: 2,
                actual: 3
            })
        );
    }

    #[test]
    fn test_unknown_header_label() {
        let mut session = ConvergenceSession::<Point>::new(2, &trace_config(), absolute).unwrap();
        let labels = vec!["Sample".to_string(), "likelihood".to_string()];
        assert!(matches!(
            session.ingest_header(0, &labels),
            Err(SessionError::Config(ConfigError::UnknownTraceLabel { .. }))
        ));
    }

    #[test]
    fn test_watermark_is_minimum_over_chains() {
        let mut session = ConvergenceSession::<Point>::new(2, &trace_config(), absolute).unwrap();
        for i in 0..5 {
            session.ingest_scalar_row(0, &[f64::from(i), 1.0]).unwrap();
        }
        for i in 0..3 {
            session.ingest_scalar_row(1, &[f64::from(i), 1.0]).unwrap();
        }
        assert_eq!(session.watermark(), 3);
        assert!(matches!(
            session.tick(4),
            Err(SessionError::WatermarkAhead {
                requested: 4,
                available: 3
            })
        ));
    }

    #[test]
    fn test_watermark_counts_trees_when_expected() {
        let mut config = trace_config();
        config.criteria.push(CriterionConfig::TreePsrf(TreePsrfConfig::default()));
        let mut session = ConvergenceSession::<Point>::new(2, &config, absolute).unwrap();
        for chain in 0..2 {
            for i in 0..4 {
                session.ingest_scalar_row(chain, &[f64::from(i), 1.0]).unwrap();
            }
            session.ingest_tree(chain, Point(0.0)).unwrap();
        }
        assert_eq!(session.watermark(), 1);
    }

    #[test]
    fn test_tick_twice_is_stable() {
        let mut session = ConvergenceSession::<Point>::new(2, &trace_config(), absolute).unwrap();
        for chain in 0..2 {
            for i in 0..100 {
                session.ingest_scalar_row(chain, &[f64::from(i), 2.0]).unwrap();
            }
        }
        let first = session.tick(100).unwrap();
        let second = session.tick(100).unwrap();
        assert!(first.converged);
        assert_eq!(first, second);
        assert_eq!(first.burnin, vec![10, 10]);
    }
}
