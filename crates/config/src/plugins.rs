//! Plugin instance configuration
//!
//! Input and output plugins are configured as `[[input]]` / `[[output]]`
//! array-of-table entries. The shared transport options live here; anything
//! the core does not recognize is collected into `options` and handed to the
//! plugin untouched.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::ConfigError;

/// Default wire protocol
pub const DEFAULT_PROTOCOL: &str = "tcp";

/// Default flush period in seconds (0 disables batching)
pub const DEFAULT_FLUSH_PERIOD_SECS: u64 = 10;

/// Default outbound admission limit in bytes (1 MiB)
pub const DEFAULT_OUTBOUND_LIMIT: usize = 1 << 20;

/// Plugin-specific options the core passes through untouched
pub type PluginOptions = HashMap<String, toml::Value>;

/// One `[[input]]` / `[[output]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Plugin name; entries without one are rejected by the loader
    #[serde(rename = "type")]
    pub plugin_type: Option<String>,

    /// Wire protocol tag ("tcp", "udp", "unix+tcp", "unix+udp")
    pub protocol: String,

    /// Peer or bind host (required for inet protocols)
    pub host: Option<String>,

    /// Peer or bind port (required for inet protocols)
    pub port: Option<u16>,

    /// Socket path (required for unix protocols)
    pub path: Option<PathBuf>,

    /// Outbound flush period in seconds; 0 means streaming mode
    pub flush_period: u64,

    /// Outbound admission limit in bytes
    pub outbound_limit: usize,

    /// Total bind retry budget in seconds; unset retries forever
    pub bind_timeout: Option<u64>,

    /// Plugin-specific options
    #[serde(flatten)]
    pub options: PluginOptions,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            plugin_type: None,
            protocol: DEFAULT_PROTOCOL.into(),
            host: None,
            port: None,
            path: None,
            flush_period: DEFAULT_FLUSH_PERIOD_SECS,
            outbound_limit: DEFAULT_OUTBOUND_LIMIT,
            bind_timeout: None,
            options: PluginOptions::new(),
        }
    }
}

impl PluginConfig {
    /// Whether the protocol tag names a unix socket family
    pub fn is_unix(&self) -> bool {
        self.protocol.starts_with("unix")
    }

    /// Validate the transport options of this entry.
    ///
    /// A missing `type` is not checked here; the loader logs and skips such
    /// entries without failing the rest of the configuration.
    pub fn validate(&self, section: &str, index: usize) -> Result<(), ConfigError> {
        let at = || {
            self.plugin_type
                .clone()
                .unwrap_or_else(|| format!("{section}[{index}]"))
        };

        if self.is_unix() {
            if self.path.is_none() {
                return Err(ConfigError::invalid(format!(
                    "{}: protocol {:?} requires `path`",
                    at(),
                    self.protocol
                )));
            }
        } else {
            if self.host.is_none() {
                return Err(ConfigError::invalid(format!(
                    "{}: protocol {:?} requires `host`",
                    at(),
                    self.protocol
                )));
            }
            if self.port.is_none() {
                return Err(ConfigError::invalid(format!(
                    "{}: protocol {:?} requires `port`",
                    at(),
                    self.protocol
                )));
            }
        }

        if self.outbound_limit == 0 {
            return Err(ConfigError::invalid(format!(
                "{}: `outbound_limit` must be greater than zero",
                at()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PluginConfig::default();
        assert_eq!(config.protocol, "tcp");
        assert_eq!(config.flush_period, 10);
        assert_eq!(config.outbound_limit, 1 << 20);
        assert!(config.plugin_type.is_none());
    }

    #[test]
    fn test_deserialize_with_extras() {
        let config: PluginConfig = toml::from_str(
            r#"
type = "carbon"
host = "127.0.0.1"
port = 2003
cache_limit = 500
"#,
        )
        .unwrap();

        assert_eq!(config.plugin_type.as_deref(), Some("carbon"));
        assert_eq!(config.port, Some(2003));
        assert_eq!(
            config.options.get("cache_limit").and_then(|v| v.as_integer()),
            Some(500)
        );
    }

    #[test]
    fn test_validate_tcp_requires_host_and_port() {
        let mut config = PluginConfig {
            plugin_type: Some("json".into()),
            ..Default::default()
        };
        assert!(config.validate("output", 0).is_err());

        config.host = Some("127.0.0.1".into());
        assert!(config.validate("output", 0).is_err());

        config.port = Some(9999);
        assert!(config.validate("output", 0).is_ok());
    }

    #[test]
    fn test_validate_unix_requires_path() {
        let mut config = PluginConfig {
            plugin_type: Some("carbon".into()),
            protocol: "unix+tcp".into(),
            ..Default::default()
        };
        assert!(config.validate("input", 0).is_err());

        config.path = Some("/run/ffwd.sock".into());
        assert!(config.validate("input", 0).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_outbound_limit() {
        let config = PluginConfig {
            plugin_type: Some("json".into()),
            host: Some("h".into()),
            port: Some(1),
            outbound_limit: 0,
            ..Default::default()
        };
        assert!(config.validate("output", 0).is_err());
    }
}
