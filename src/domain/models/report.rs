//! Results reported by the session and the watcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Decision and diagnostics of one criterion on one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionStatus {
    /// Column header of the criterion, e.g. `TreePsrf`.
    pub header: String,
    /// Whether the criterion passed.
    pub converged: bool,
    /// Named diagnostic values such as `GRT-0` or `posterior`.
    pub values: Vec<(String, f64)>,
}

/// Result of evaluating the session at one watermark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    /// Samples per chain considered.
    pub watermark: usize,
    /// Burn-in per chain.
    pub burnin: Vec<usize>,
    /// True when every registered criterion converged.
    pub converged: bool,
    /// Status of each criterion, in registration order.
    pub criteria: Vec<CriterionStatus>,
}

impl TickOutcome {
    /// Flattened `(name, value)` pairs of every criterion, for logging.
    pub fn log_values(&self) -> Vec<(String, f64)> {
        self.criteria
            .iter()
            .flat_map(|status| status.values.iter().cloned())
            .collect()
    }
}

/// Why a monitoring run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// All criteria converged.
    Converged,
    /// Every producer finished before convergence.
    ChainsFinished,
    /// Stop was requested from outside.
    Requested,
}

/// Summary of a complete monitoring run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorReport {
    /// Session identifier.
    pub session_id: Uuid,
    /// Start of monitoring.
    pub started_at: DateTime<Utc>,
    /// End of monitoring.
    pub finished_at: DateTime<Utc>,
    /// Why the run ended.
    pub reason: StopReason,
    /// Ticks evaluated.
    pub ticks: usize,
    /// Last evaluated outcome, if any tick happened.
    pub last: Option<TickOutcome>,
}

impl MonitorReport {
    /// Whether the run ended on convergence.
    pub fn converged(&self) -> bool {
        self.reason == StopReason::Converged
    }

    /// Burn-in of the last tick, or zeros when nothing was evaluated.
    pub fn burnin(&self, chain_count: usize) -> Vec<usize> {
        self.last
            .as_ref()
            .map_or_else(|| vec![0; chain_count], |last| last.burnin.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_values_flatten_in_criterion_order() {
        let outcome = TickOutcome {
            watermark: 10,
            burnin: vec![1, 2],
            converged: false,
            criteria: vec![
                CriterionStatus {
                    header: "GelmanRubin".to_string(),
                    converged: true,
                    values: vec![("posterior".to_string(), 1.01)],
                },
                CriterionStatus {
                    header: "TreePsrf".to_string(),
                    converged: false,
                    values: vec![("GRT-0".to_string(), 1.2), ("GRT-1".to_string(), -2.0)],
                },
            ],
        };
        let names: Vec<String> = outcome.log_values().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["posterior", "GRT-0", "GRT-1"]);
    }

    #[test]
    fn test_report_burnin_defaults_to_zero() {
        let report = MonitorReport {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            reason: StopReason::ChainsFinished,
            ticks: 0,
            last: None,
        };
        assert_eq!(report.burnin(2), vec![0, 0]);
        assert!(!report.converged());
    }
}
