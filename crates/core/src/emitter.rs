//! Core emitter - default stamping
//!
//! Fills fields the record's producer left empty from the `[core]`
//! configuration, then publishes onto the output channel. A record's own
//! fields always win; configured tags and attributes are merged in.

use std::sync::Arc;

use ffwd_channel::PluginChannel;
use ffwd_config::CoreConfig;
use ffwd_processor::Emitter;
use ffwd_protocol::{epoch_seconds, Event, Metric};

/// Stamps configured defaults and republishes onto the output channel.
pub struct CoreEmitter {
    config: CoreConfig,
    output: Arc<PluginChannel>,
}

impl CoreEmitter {
    /// Create an emitter over the output channel
    pub fn new(config: CoreConfig, output: Arc<PluginChannel>) -> Self {
        Self { config, output }
    }

    fn stamp_metric(&self, metric: &mut Metric) {
        if metric.time.is_none() {
            metric.time = Some(epoch_seconds());
        }
        if metric.host.is_none() {
            metric.host = self.config.host.clone();
        }
        if metric.ttl.is_none() {
            metric.ttl = self.config.ttl;
        }
        for tag in &self.config.tags {
            metric.tags.insert(tag.clone());
        }
        for (key, value) in &self.config.attributes {
            metric
                .attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    fn stamp_event(&self, event: &mut Event) {
        if event.time.is_none() {
            event.time = Some(epoch_seconds());
        }
        if event.host.is_none() {
            event.host = self.config.host.clone();
        }
        if event.ttl.is_none() {
            event.ttl = self.config.ttl;
        }
        for tag in &self.config.tags {
            event.tags.insert(tag.clone());
        }
        for (key, value) in &self.config.attributes {
            event
                .attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

impl Emitter for CoreEmitter {
    fn emit_metric(&self, mut metric: Metric) {
        self.stamp_metric(&mut metric);
        self.output.metric.publish(&metric);
    }

    fn emit_event(&self, mut event: Event) {
        self.stamp_event(&mut event);
        self.output.event.publish(&event);
    }
}
