//! Settings for the convergence criteria.
//!
//! Each criterion has a serde-friendly settings struct with defaults taken
//! from established practice (Gelman-Rubin threshold 1.05, target ESS 100,
//! tree PSRF tolerance 0.05, clade difference 0.25). The settings validate
//! themselves against the session's chain count so misconfiguration fails
//! before the first sample is read.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::errors::ConfigError;

/// One configured stopping criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CriterionConfig {
    /// Scalar PSRF over trace columns
    GelmanRubin(GelmanRubinConfig),
    /// Minimum ESS over trace columns
    TraceEss(TraceEssConfig),
    /// Tree PSRF over a tree window
    TreePsrf(TreePsrfConfig),
    /// Pseudo ESS over a tree window
    TreeEss(TreeEssConfig),
    /// Split clade frequency difference
    CladeDifference(CladeDifferenceConfig),
}

impl CriterionConfig {
    /// Check the settings for a session of `chain_count` chains.
    pub fn validate(&self, chain_count: usize) -> Result<(), ConfigError> {
        match self {
            Self::GelmanRubin(c) => c.validate(),
            Self::TraceEss(c) => c.validate(),
            Self::TreePsrf(c) => c.validate(chain_count),
            Self::TreeEss(c) => c.validate(chain_count),
            Self::CladeDifference(c) => c.validate(),
        }
    }

    /// Whether the criterion reads tree sequences.
    pub fn needs_trees(&self) -> bool {
        matches!(
            self,
            Self::TreePsrf(_) | Self::TreeEss(_) | Self::CladeDifference(_)
        )
    }

    /// Whether the criterion reads scalar trace columns.
    pub fn needs_traces(&self) -> bool {
        matches!(self, Self::GelmanRubin(_) | Self::TraceEss(_))
    }
}

/// Variant of the potential scale reduction factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PsrfForm {
    /// `sqrt((n-1)/n + B/(W n))`
    #[default]
    Classic,
    /// Brooks-Gelman corrected form with `(m+1)/m` scaling of `B`.
    BrooksGelman,
}

/// Gelman-Rubin criterion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GelmanRubinConfig {
    /// Largest PSRF still accepted for every column.
    pub threshold: f64,
    /// PSRF formula.
    pub form: PsrfForm,
    /// Update running sums per tick instead of recomputing.
    pub incremental: bool,
    /// Burn-in used by the incremental mode, in percent of the watermark.
    pub burn_in_percent: u32,
}

impl Default for GelmanRubinConfig {
    fn default() -> Self {
        Self {
            threshold: 1.05,
            form: PsrfForm::Classic,
            incremental: false,
            burn_in_percent: 10,
        }
    }
}

impl GelmanRubinConfig {
    /// Reject a threshold below 1 or a percentage above 99.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || self.threshold < 1.0 {
            return Err(ConfigError::InvalidThreshold {
                criterion: "GelmanRubin",
                value: self.threshold,
            });
        }
        if self.burn_in_percent > 99 {
            return Err(ConfigError::InvalidBurnInPercent(self.burn_in_percent));
        }
        Ok(())
    }
}

/// Trace ESS criterion settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceEssConfig {
    /// Target effective sample size per chain.
    pub target_ess: usize,
}

impl Default for TraceEssConfig {
    fn default() -> Self {
        Self { target_ess: 100 }
    }
}

impl TraceEssConfig {
    /// Reject a zero target.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_ess == 0 {
            return Err(ConfigError::InvalidTargetEss(self.target_ess));
        }
        Ok(())
    }
}

/// Settings shared by the tree based criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeWindowConfig {
    /// Target effective sample size per chain.
    pub target_ess: usize,
    /// Larger smoothing means more trees are included in the test.
    pub smoothing: f64,
    /// Maximum number of trees per chain kept in the evaluation stride.
    pub cache_limit: usize,
    /// Number of reference trees used for the pseudo ESS.
    pub sample_size: usize,
}

impl Default for TreeWindowConfig {
    fn default() -> Self {
        Self {
            target_ess: 100,
            smoothing: 0.9,
            cache_limit: 1024,
            sample_size: 10,
        }
    }
}

impl TreeWindowConfig {
    /// Validate the window for `criterion`, which needs exactly two chains.
    ///
    /// Warns when the cache limit is under twice the target ESS.
    pub fn validate(&self, criterion: &'static str, chain_count: usize) -> Result<(), ConfigError> {
        if chain_count != 2 {
            return Err(ConfigError::ChainCountMismatch {
                criterion,
                actual: chain_count,
            });
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(ConfigError::InvalidSmoothing(self.smoothing));
        }
        if self.target_ess == 0 {
            return Err(ConfigError::InvalidTargetEss(self.target_ess));
        }
        if self.cache_limit <= self.target_ess {
            return Err(ConfigError::CacheLimitTooSmall {
                cache_limit: self.cache_limit,
                target_ess: self.target_ess,
            });
        }
        if self.cache_limit < 2 * self.target_ess {
            warn!(
                cache_limit = self.cache_limit,
                target_ess = self.target_ess,
                "cache_limit should preferably be twice as large as target_ess to prevent late stopping"
            );
        }
        if self.sample_size == 0 || self.sample_size >= self.target_ess {
            return Err(ConfigError::InvalidSampleSize {
                sample_size: self.sample_size,
                target_ess: self.target_ess,
            });
        }
        Ok(())
    }
}

/// Tree PSRF criterion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreePsrfConfig {
    /// Window over the tree sequences.
    #[serde(flatten)]
    pub window: TreeWindowConfig,
    /// Acceptance tolerance around 1 for the PSRF-like statistic.
    pub b: f64,
    /// Compute statistics for both chains instead of only the first.
    pub two_sided: bool,
    /// Also require the pseudo ESS to reach `target_ess`.
    pub check_ess: bool,
}

impl Default for TreePsrfConfig {
    fn default() -> Self {
        Self {
            window: TreeWindowConfig::default(),
            b: 0.05,
            two_sided: true,
            check_ess: false,
        }
    }
}

impl TreePsrfConfig {
    /// Validate the window and require `b` in `(0, 1)`.
    pub fn validate(&self, chain_count: usize) -> Result<(), ConfigError> {
        self.window.validate("TreePsrf", chain_count)?;
        if !self.b.is_finite() || self.b <= 0.0 || self.b >= 1.0 {
            return Err(ConfigError::InvalidThreshold {
                criterion: "TreePsrf",
                value: self.b,
            });
        }
        Ok(())
    }
}

/// Tree ESS criterion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TreeEssConfig {
    /// Window over the tree sequences.
    #[serde(flatten)]
    pub window: TreeWindowConfig,
}

impl TreeEssConfig {
    /// Validate the window.
    pub fn validate(&self, chain_count: usize) -> Result<(), ConfigError> {
        self.window.validate("TreeEss", chain_count)
    }
}

/// Clade difference criterion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CladeDifferenceConfig {
    /// Largest clade frequency difference still accepted.
    pub threshold: f64,
}

impl Default for CladeDifferenceConfig {
    fn default() -> Self {
        Self { threshold: 0.25 }
    }
}

impl CladeDifferenceConfig {
    /// Require a positive finite threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold {
                criterion: "CladeDifference",
                value: self.threshold,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_yaml_with_flattened_window() {
        let yaml = r"
type: tree_psrf
target_ess: 200
smoothing: 0.6
cache_limit: 1000
two_sided: false
";
        let config: CriterionConfig = serde_yaml::from_str(yaml).expect("YAML should parse");
        match config {
            CriterionConfig::TreePsrf(c) => {
                assert_eq!(c.window.target_ess, 200);
                assert!((c.window.smoothing - 0.6).abs() < f64::EPSILON);
                assert_eq!(c.window.sample_size, 10);
                assert!(!c.two_sided);
                assert!((c.b - 0.05).abs() < f64::EPSILON);
            }
            other => panic!("Expected TreePsrf, got {other:?}"),
        }
    }

    #[test]
    fn test_tree_criteria_need_two_chains() {
        let config = TreePsrfConfig::default();
        assert!(config.validate(2).is_ok());
        assert!(matches!(
            config.validate(3),
            Err(ConfigError::ChainCountMismatch { actual: 3, .. })
        ));
    }

    #[test]
    fn test_sample_size_must_be_below_target() {
        let mut config = TreeEssConfig::default();
        config.window.sample_size = 100;
        assert!(matches!(
            config.validate(2),
            Err(ConfigError::InvalidSampleSize { sample_size: 100, .. })
        ));
    }

    #[test]
    fn test_cache_limit_must_exceed_target() {
        let mut config = TreePsrfConfig::default();
        config.window.cache_limit = 100;
        assert!(matches!(
            config.validate(2),
            Err(ConfigError::CacheLimitTooSmall { .. })
        ));
    }

    #[test]
    fn test_smoothing_range() {
        let mut config = TreePsrfConfig::default();
        config.window.smoothing = 1.0;
        assert_eq!(config.validate(2), Err(ConfigError::InvalidSmoothing(1.0)));
    }

    #[test]
    fn test_gelman_rubin_threshold() {
        let config = GelmanRubinConfig {
            threshold: 0.9,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(GelmanRubinConfig::default().validate().is_ok());
    }

    #[test]
    fn test_stream_requirements() {
        assert!(CriterionConfig::CladeDifference(CladeDifferenceConfig::default()).needs_trees());
        assert!(!CriterionConfig::TraceEss(TraceEssConfig::default()).needs_trees());
        assert!(CriterionConfig::GelmanRubin(GelmanRubinConfig::default()).needs_traces());
    }
}
