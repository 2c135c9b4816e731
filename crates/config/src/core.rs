//! Core emitter defaults

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

/// Defaults the core emitter stamps onto records that are missing them.
///
/// ```toml
/// [core]
/// host = "web-1"
/// tags = ["role:web"]
/// attributes = { dc = "lon" }
/// ttl = 300
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Default originating host
    pub host: Option<String>,

    /// Tags merged into every record
    pub tags: BTreeSet<String>,

    /// Attributes merged into every record (record's own entries win)
    pub attributes: BTreeMap<String, String>,

    /// Default time-to-live in seconds
    pub ttl: Option<u64>,
}
