//! count processor - running per-key totals
//!
//! Every processed sample adds into a bounded per-key accumulator and the
//! new total is emitted immediately, so downstream always sees the latest
//! running sum. There is no time windowing.
//!
//! When the accumulator is full, samples for keys not already tracked are
//! dropped (and counted); existing keys keep updating.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ffwd_metrics::{CounterValue, Reporter};
use ffwd_protocol::Metric;

use crate::registry::{opt_usize, ProcessorFactory, ProcessorOpts};
use crate::{Emitter, Processor, ProcessorError};

/// Default accumulator capacity
pub const DEFAULT_CACHE_LIMIT: usize = 10_000;

#[derive(Debug)]
struct CountCounters {
    received: AtomicU64,
    emitted: AtomicU64,
    dropped_keys: AtomicU64,
}

impl Reporter for CountCounters {
    fn id(&self) -> &str {
        "processor:count"
    }

    fn is_active(&self) -> bool {
        self.received.load(Ordering::Relaxed) != 0
            || self.dropped_keys.load(Ordering::Relaxed) != 0
    }

    fn drain(&self) -> Vec<CounterValue> {
        vec![
            CounterValue::new("received", self.received.swap(0, Ordering::Relaxed)),
            CounterValue::new("emitted", self.emitted.swap(0, Ordering::Relaxed)),
            CounterValue::new("dropped_keys", self.dropped_keys.swap(0, Ordering::Relaxed)),
        ]
    }
}

/// Running-total aggregation processor.
pub struct CountProcessor {
    cache: HashMap<String, f64>,
    cache_limit: usize,
    emitter: Option<Arc<dyn Emitter>>,
    counters: Arc<CountCounters>,
}

impl CountProcessor {
    /// Create a count processor with the given accumulator capacity
    pub fn new(cache_limit: usize) -> Self {
        Self {
            cache: HashMap::new(),
            cache_limit,
            emitter: None,
            counters: Arc::new(CountCounters {
                received: AtomicU64::new(0),
                emitted: AtomicU64::new(0),
                dropped_keys: AtomicU64::new(0),
            }),
        }
    }

    /// Number of tracked keys
    pub fn tracked_keys(&self) -> usize {
        self.cache.len()
    }
}

impl Processor for CountProcessor {
    fn name(&self) -> &'static str {
        "count"
    }

    fn start(&mut self, emitter: Arc<dyn Emitter>, _cancel: &CancellationToken) {
        self.emitter = Some(emitter);
    }

    fn process(&mut self, metric: Metric) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let Some(emitter) = &self.emitter else {
            return;
        };

        if !self.cache.contains_key(&metric.key) && self.cache.len() >= self.cache_limit {
            self.counters.dropped_keys.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let total = {
            let slot = self.cache.entry(metric.key.clone()).or_insert(0.0);
            *slot += metric.value;
            *slot
        };

        emitter.emit_metric(Metric {
            value: total,
            proc: None,
            ..metric
        });
        self.counters.emitted.fetch_add(1, Ordering::Relaxed);
    }

    fn reporter(&self) -> Option<Arc<dyn Reporter>> {
        Some(Arc::clone(&self.counters) as Arc<dyn Reporter>)
    }
}

/// Factory for the count processor; accepts `cache_limit`.
pub struct CountFactory;

impl ProcessorFactory for CountFactory {
    fn name(&self) -> &'static str {
        "count"
    }

    fn create(&self, opts: &ProcessorOpts) -> Result<Box<dyn Processor>, ProcessorError> {
        let cache_limit = opt_usize(opts, "cache_limit")?.unwrap_or(DEFAULT_CACHE_LIMIT);
        Ok(Box::new(CountProcessor::new(cache_limit)))
    }
}
