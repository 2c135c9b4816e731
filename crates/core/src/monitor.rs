//! Channel debug monitor
//!
//! Attached to the input and output channels when `[debug]` is configured.
//! Every item crossing a monitored channel produces a debug-level log line
//! tagged with the channel id; the monitor keeps simple totals so the debug
//! surface can show traffic at a glance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ffwd_channel::{PluginChannel, Subscription};

/// Per-channel traffic monitor.
pub struct ChannelMonitor {
    events_seen: Arc<AtomicU64>,
    metrics_seen: Arc<AtomicU64>,
    _subscriptions: Vec<Subscription>,
}

impl ChannelMonitor {
    /// Subscribe to both topics of a channel
    pub fn attach(channel: &PluginChannel) -> Self {
        let events_seen = Arc::new(AtomicU64::new(0));
        let metrics_seen = Arc::new(AtomicU64::new(0));
        let mut subscriptions = Vec::with_capacity(2);

        let id = channel.id().to_string();
        let counter = Arc::clone(&events_seen);
        subscriptions.push(channel.event.subscribe(move |event| {
            counter.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(channel = %id, key = %event.key, "event");
            Ok(())
        }));

        let id = channel.id().to_string();
        let counter = Arc::clone(&metrics_seen);
        subscriptions.push(channel.metric.subscribe(move |metric| {
            counter.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(channel = %id, key = %metric.key, value = metric.value, "metric");
            Ok(())
        }));

        Self {
            events_seen,
            metrics_seen,
            _subscriptions: subscriptions,
        }
    }

    /// Items seen so far as (events, metrics)
    pub fn seen(&self) -> (u64, u64) {
        (
            self.events_seen.load(Ordering::Relaxed),
            self.metrics_seen.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use ffwd_protocol::{Event, Metric};

    use super::*;

    #[test]
    fn test_counts_both_topics() {
        let channel = PluginChannel::new("input");
        let monitor = ChannelMonitor::attach(&channel);

        channel.metric.publish(&Metric::new("m", 1.0));
        channel.metric.publish(&Metric::new("m", 2.0));
        channel.event.publish(&Event::new("e"));

        assert_eq!(monitor.seen(), (1, 2));
    }
}
