//! Burn-in estimation strategies.

use serde::{Deserialize, Serialize};

use crate::domain::errors::ConfigError;

/// Default burn-in percentage for [`BurnInStrategy::FixedFraction`].
pub const DEFAULT_BURN_IN_PERCENT: u32 = 10;

/// How the session estimates the stationary start of every chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BurnInStrategy {
    /// First window of 10 samples whose average lies within one stdev of the
    /// mean of the last quarter.
    MovingAverage,
    /// First split whose early and late halves have overlapping value ranges.
    RangeOverlap {
        /// Try one step further and keep whichever start has the larger ESS.
        #[serde(default = "default_refine")]
        refine: bool,
    },
    /// A fixed percentage of the samples seen so far.
    FixedFraction {
        /// Percentage in `0..=99`.
        #[serde(default = "default_percent")]
        percent: u32,
    },
}

const fn default_refine() -> bool {
    true
}

const fn default_percent() -> u32 {
    DEFAULT_BURN_IN_PERCENT
}

impl Default for BurnInStrategy {
    fn default() -> Self {
        Self::MovingAverage
    }
}

impl BurnInStrategy {
    /// Configuration name of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MovingAverage => "moving_average",
            Self::RangeOverlap { .. } => "range_overlap",
            Self::FixedFraction { .. } => "fixed_fraction",
        }
    }

    /// Reject a fixed fraction above 99 percent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::FixedFraction { percent } if *percent > 99 => {
                Err(ConfigError::InvalidBurnInPercent(*percent))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_tagged_strategy() {
        let strategy: BurnInStrategy =
            serde_yaml::from_str("strategy: fixed_fraction\npercent: 25").unwrap();
        assert_eq!(strategy, BurnInStrategy::FixedFraction { percent: 25 });

        let strategy: BurnInStrategy = serde_yaml::from_str("strategy: range_overlap").unwrap();
        assert_eq!(strategy, BurnInStrategy::RangeOverlap { refine: true });
    }

    #[test]
    fn test_percent_bounds() {
        assert!(BurnInStrategy::FixedFraction { percent: 99 }.validate().is_ok());
        assert_eq!(
            BurnInStrategy::FixedFraction { percent: 100 }.validate(),
            Err(ConfigError::InvalidBurnInPercent(100))
        );
    }
}
