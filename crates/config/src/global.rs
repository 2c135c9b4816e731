//! Top-level configuration

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::{ConfigError, CoreConfig, LogConfig, PluginConfig};

/// Default reporting interval in seconds
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 600;

/// Statistics emission configuration; the presence of a `[statistics]`
/// table turns counter reports into metrics on the input channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Key prefix for emitted metrics
    pub prefix: String,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            prefix: "ffwd".into(),
        }
    }
}

/// Debug configuration; the presence of a `[debug]` table attaches channel
/// monitors to the input and output channels.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DebugConfig {}

/// The daemon's full configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging behavior
    pub log: LogConfig,

    /// Defaults the emitter applies
    pub core: CoreConfig,

    /// Reporter drain interval in seconds
    pub report_interval: Option<u64>,

    /// Input plugin instances
    pub input: Vec<PluginConfig>,

    /// Output plugin instances
    pub output: Vec<PluginConfig>,

    /// Per-processor options (`[processor_opts.count] cache_limit = ...`)
    pub processor_opts: HashMap<String, toml::Table>,

    /// Statistics emission, if configured
    pub statistics: Option<StatisticsConfig>,

    /// Debug monitors, if configured
    pub debug: Option<DebugConfig>,
}

impl Config {
    /// Load and validate a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    /// Parse and validate a TOML config string
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reporter drain interval
    pub fn report_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.report_interval.unwrap_or(DEFAULT_REPORT_INTERVAL_SECS),
        )
    }

    /// Options table for one processor, if configured
    pub fn processor_opts(&self, name: &str) -> Option<&toml::Table> {
        self.processor_opts.get(name)
    }

    /// Validate transport options of every typed plugin entry.
    ///
    /// Entries without a `type` are left for the loader to reject
    /// individually; a broken entry there must not stop the other plugins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, plugin) in self.input.iter().enumerate() {
            if plugin.plugin_type.is_some() {
                plugin.validate("input", index)?;
            }
        }
        for (index, plugin) in self.output.iter().enumerate() {
            if plugin.plugin_type.is_some() {
                plugin.validate("output", index)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_valid() {
        let config = Config::from_toml("").unwrap();
        assert!(config.input.is_empty());
        assert!(config.output.is_empty());
        assert!(config.statistics.is_none());
        assert!(config.debug.is_none());
        assert_eq!(
            config.report_interval(),
            std::time::Duration::from_secs(600)
        );
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
report_interval = 60

[log]
level = "debug"

[core]
host = "web-1"

[[input]]
type = "carbon"
host = "0.0.0.0"
port = 2003

[[output]]
type = "json"
host = "127.0.0.1"
port = 19000
flush_period = 0

[processor_opts.count]
cache_limit = 500

[statistics]
prefix = "agent"

[debug]
"#,
        )
        .unwrap();

        assert_eq!(config.report_interval(), std::time::Duration::from_secs(60));
        assert_eq!(config.input.len(), 1);
        assert_eq!(config.output.len(), 1);
        assert_eq!(config.output[0].flush_period, 0);
        assert_eq!(
            config
                .processor_opts("count")
                .and_then(|t| t.get("cache_limit"))
                .and_then(|v| v.as_integer()),
            Some(500)
        );
        assert_eq!(config.statistics.unwrap().prefix, "agent");
        assert!(config.debug.is_some());
    }

    #[test]
    fn test_typed_entry_missing_host_fails() {
        let result = Config::from_toml(
            r#"
[[output]]
type = "json"
port = 19000
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_untyped_entry_does_not_fail_validation() {
        // The loader rejects it per-entry; other plugins still start.
        let config = Config::from_toml(
            r#"
[[output]]
host = "127.0.0.1"
"#,
        )
        .unwrap();
        assert!(config.output[0].plugin_type.is_none());
    }

    #[test]
    fn test_statistics_default_prefix() {
        let config = Config::from_toml("[statistics]\n").unwrap();
        assert_eq!(config.statistics.unwrap().prefix, "ffwd");
    }
}
