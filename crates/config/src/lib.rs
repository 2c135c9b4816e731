//! FFWD configuration
//!
//! TOML-backed configuration for the daemon. Every section has working
//! defaults; an empty file is a valid configuration (one that ingests
//! nothing and emits nothing).
//!
//! # Example
//!
//! ```toml
//! [core]
//! host = "web-1"
//! tags = ["role:web"]
//!
//! [[input]]
//! type = "carbon"
//! port = 2003
//!
//! [[output]]
//! type = "json"
//! host = "telemetry.internal"
//! port = 19000
//! flush_period = 10
//! ```

mod core;
mod error;
mod global;
mod logging;
mod plugins;

pub use crate::core::CoreConfig;
pub use error::ConfigError;
pub use global::{Config, DebugConfig, StatisticsConfig, DEFAULT_REPORT_INTERVAL_SECS};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use plugins::{
    PluginConfig, PluginOptions, DEFAULT_FLUSH_PERIOD_SECS, DEFAULT_OUTBOUND_LIMIT,
    DEFAULT_PROTOCOL,
};
