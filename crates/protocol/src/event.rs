//! Event record

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// A discrete occurrence flowing through the daemon.
///
/// Unlike [`Metric`](crate::Metric), the value is optional and the record
/// carries a human-readable description and a state string.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Event {
    /// Event key (e.g. "deploy.finished")
    pub key: String,

    /// Optional numeric value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

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

    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// State string (e.g. "ok", "critical")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Time-to-live in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl Event {
    /// Create an event with just a key
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Set the value
    #[must_use]
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
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

    /// Set the state string
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults() {
        let e = Event::new("deploy.finished");
        assert_eq!(e.key, "deploy.finished");
        assert!(e.value.is_none());
        assert!(e.state.is_none());
        assert!(e.tags.is_empty());
    }

    #[test]
    fn test_serialize_skips_empty() {
        let e = Event::new("a");
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, r#"{"key":"a"}"#);
    }

    #[test]
    fn test_serialize_full() {
        let e = Event::new("a")
            .with_value(1.0)
            .with_time(1700000000)
            .with_state("ok");
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains(r#""value":1.0"#));
        assert!(json.contains(r#""time":1700000000"#));
        assert!(json.contains(r#""state":"ok""#));
    }
}
