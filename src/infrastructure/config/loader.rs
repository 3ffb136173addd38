//! Figment-based loading of [`Config`] from defaults, YAML files and
//! `AUTOSTOP_` environment variables.

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};

use crate::domain::errors::ConfigError;
use crate::domain::models::config::Config;

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .autostop/config.yaml (project config)
    /// 3. .autostop/local.yaml (project local overrides, optional)
    /// 4. Environment variables (AUTOSTOP_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring environment
    /// overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("AUTOSTOP_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            // 1. Start with programmatic defaults
            .merge(Serialized::defaults(Config::default()))
            // 2. Merge project config
            .merge(Yaml::file(".autostop/config.yaml"))
            // 3. Merge project local overrides
            .merge(Yaml::file(".autostop/local.yaml"))
            // 4. Merge environment variables (highest priority)
            .merge(Env::prefixed("AUTOSTOP_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.chains < 2 {
            return Err(ConfigError::InvalidChainCount(config.chains));
        }

        // Validate logging config
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        // Validate session config
        config.session.burn_in.validate()?;
        if config.session.traces.is_empty() {
            return Err(ConfigError::EmptyTraceLabels);
        }
        if config.session.criteria.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "At least one stopping criterion must be configured".to_string(),
            ));
        }
        for criterion in &config.session.criteria {
            criterion.validate(config.chains)?;
        }

        // Validate monitor config
        if config.monitor.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval(
                config.monitor.poll_interval_ms,
            ));
        }
        if config.monitor.channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity(
                config.monitor.channel_capacity,
            ));
        }
        if config.monitor.trace_log.is_empty() || config.monitor.tree_log.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Log file names cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::criteria::{CriterionConfig, TraceEssConfig};
    use crate::domain::models::strategy::BurnInStrategy;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chains, 2);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.session.criteria.len(), 2);
        assert_eq!(config.monitor.poll_interval_ms, 1000);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
chains: 2
logging:
  level: debug
  format: json
session:
  burn_in:
    strategy: range_overlap
    refine: false
  traces: [posterior, likelihood]
  criteria:
    - type: gelman_rubin
      threshold: 1.01
    - type: clade_difference
monitor:
  trace_log: beast.log
  poll_interval_ms: 250
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.session.burn_in,
            BurnInStrategy::RangeOverlap { refine: false }
        );
        assert_eq!(config.session.traces, vec!["posterior", "likelihood"]);
        assert_eq!(config.session.criteria.len(), 2);
        assert!(config.session.expects_trees());
        assert_eq!(config.monitor.trace_log, "beast.log");
        assert_eq!(config.monitor.tree_log, "trees.trees");
        assert_eq!(config.monitor.poll_interval_ms, 250);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_single_chain() {
        let config = Config {
            chains: 1,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidChainCount(1))
        ));
    }

    #[test]
    fn test_validate_tree_criterion_with_three_chains() {
        let config = Config {
            chains: 3,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ChainCountMismatch { actual: 3, .. })
        ));

        let mut config = config;
        config.session.criteria = vec![CriterionConfig::TraceEss(TraceEssConfig::default())];
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogFormat(format)) => assert_eq!(format, "xml"),
            other => panic!("Expected InvalidLogFormat error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = Config::default();
        config.monitor.poll_interval_ms = 0;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidPollInterval(0))
        );
    }

    #[test]
    fn test_validate_empty_criteria() {
        let mut config = Config::default();
        config.session.criteria.clear();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "chains: 2\nlogging:\n  level: info\n  format: json\nmonitor:\n  poll_interval_ms: 500"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "logging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(
            config.logging.level, "debug",
            "Override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
        assert_eq!(config.monitor.poll_interval_ms, 500);
        assert_eq!(config.session.criteria.len(), 2);
    }
}
