//! Metric record

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// A single numeric sample flowing through the daemon.
///
/// Same shape as [`Event`](crate::Event) except that `value` is required.
/// The optional `proc` field names the processor the core dispatcher should
/// route this metric through; it is routing metadata, not payload, and is
/// never serialized to the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metric {
    /// Metric key (e.g. "srv.load")
    pub key: String,

    /// Sample value
    pub value: f64,

    /// Timestamp, seconds since epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,

    /// Originating host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Free-form tags
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// Key/value attributes
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    /// Time-to-live in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,

    /// Processor to route through, if any
    #[serde(skip)]
    pub proc: Option<String>,
}

impl Metric {
    /// Create a metric with just a key and value
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
            ..Self::default()
        }
    }

    /// Set the timestamp
    #[must_use]
    pub fn with_time(mut self, time: i64) -> Self {
        self.time = Some(time);
        self
    }

    /// Set the originating host
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the processor routing tag
    #[must_use]
    pub fn with_proc(mut self, proc: impl Into<String>) -> Self {
        self.proc = Some(proc.into());
        self
    }

    /// Add a tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}
