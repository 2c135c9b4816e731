//! Periodic statistics aggregator
//!
//! Runs on its own task; every `interval` it walks the registered reporters
//! and drains the active ones. Drained counters always become structured log
//! lines; with emission configured they are also published as metrics onto
//! the input channel so the daemon's own traffic is visible downstream.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use ffwd_channel::PluginChannel;
use ffwd_protocol::Metric;

use crate::Reporter;

/// Collects registered reporters and drains them on a periodic timer.
pub struct Statistics {
    interval: Duration,
    reporters: Vec<Arc<dyn Reporter>>,
    emit: Option<Emission>,
}

struct Emission {
    input: Arc<PluginChannel>,
    prefix: String,
}

impl Statistics {
    /// Create an aggregator with the given reporting interval
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            reporters: Vec::new(),
            emit: None,
        }
    }

    /// Register a reporter
    pub fn register(&mut self, reporter: Arc<dyn Reporter>) {
        self.reporters.push(reporter);
    }

    /// Number of registered reporters
    pub fn reporter_count(&self) -> usize {
        self.reporters.len()
    }

    /// Also publish drained counters as metrics onto `input`, keyed
    /// `{prefix}.{counter}` with a `component` attribute naming the reporter.
    pub fn emit_to(&mut self, input: Arc<PluginChannel>, prefix: impl Into<String>) {
        self.emit = Some(Emission {
            input,
            prefix: prefix.into(),
        });
    }

    /// Drain every active reporter once
    pub fn report(&self) {
        for reporter in &self.reporters {
            if !reporter.is_active() {
                continue;
            }
            for counter in reporter.drain() {
                tracing::info!(
                    component = reporter.id(),
                    counter = counter.name,
                    value = counter.value,
                    "statistics"
                );
                if let Some(emission) = &self.emit {
                    let metric = Metric::new(
                        format!("{}.{}", emission.prefix, counter.name),
                        counter.value as f64,
                    )
                    .with_attribute("component", reporter.id());
                    emission.input.metric.publish(&metric);
                }
            }
        }
    }

    /// Run the reporting timer until cancellation.
    ///
    /// Spawn this as a task; the first report fires one full interval after
    /// startup.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            reporters = self.reporters.len(),
            "statistics reporter started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("statistics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.report();
                }
            }
        }
    }
}
