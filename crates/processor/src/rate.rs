//! rate processor - per-key rates over a periodic window
//!
//! Samples accumulate per key in the current window; a timer armed by
//! `start` fires every `period`, emits `accumulated / period` for every key
//! seen in the window, and clears it. Derived metrics carry only key and
//! value; the emitter stamps the usual defaults.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use ffwd_metrics::{CounterValue, Reporter};
use ffwd_protocol::Metric;

use crate::registry::{opt_usize, ProcessorFactory, ProcessorOpts};
use crate::{Emitter, Processor, ProcessorError};

/// Default emission period
pub const DEFAULT_RATE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct RateCounters {
    received: AtomicU64,
    emitted: AtomicU64,
    dropped_keys: AtomicU64,
}

impl Reporter for RateCounters {
    fn id(&self) -> &str {
        "processor:rate"
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

/// Windowed rate aggregation processor.
pub struct RateProcessor {
    window: Arc<Mutex<HashMap<String, f64>>>,
    cache_limit: usize,
    period: Duration,
    counters: Arc<RateCounters>,
}

impl RateProcessor {
    /// Create a rate processor
    pub fn new(period: Duration, cache_limit: usize) -> Self {
        Self {
            window: Arc::new(Mutex::new(HashMap::new())),
            cache_limit,
            period,
            counters: Arc::new(RateCounters {
                received: AtomicU64::new(0),
                emitted: AtomicU64::new(0),
                dropped_keys: AtomicU64::new(0),
            }),
        }
    }
}

impl Processor for RateProcessor {
    fn name(&self) -> &'static str {
        "rate"
    }

    fn start(&mut self, emitter: Arc<dyn Emitter>, cancel: &CancellationToken) {
        let window = Arc::clone(&self.window);
        let counters = Arc::clone(&self.counters);
        let period = self.period;
        let cancel = cancel.clone();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let divisor = period.as_secs_f64();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let sums = std::mem::take(&mut *window.lock());
                        for (key, sum) in sums {
                            emitter.emit_metric(Metric::new(key, sum / divisor));
                            counters.emitted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        });
    }

    fn process(&mut self, metric: Metric) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let mut window = self.window.lock();
        if !window.contains_key(&metric.key) && window.len() >= self.cache_limit {
            self.counters.dropped_keys.fetch_add(1, Ordering::Relaxed);
            return;
        }
        *window.entry(metric.key).or_insert(0.0) += metric.value;
    }

    fn reporter(&self) -> Option<Arc<dyn Reporter>> {
        Some(Arc::clone(&self.counters) as Arc<dyn Reporter>)
    }
}

/// Factory for the rate processor; accepts `period` (seconds) and
/// `cache_limit`.
pub struct RateFactory;

impl ProcessorFactory for RateFactory {
    fn name(&self) -> &'static str {
        "rate"
    }

    fn create(&self, opts: &ProcessorOpts) -> Result<Box<dyn Processor>, ProcessorError> {
        let period = opt_usize(opts, "period")?
            .map(|secs| Duration::from_secs(secs as u64))
            .unwrap_or(DEFAULT_RATE_PERIOD);
        if period.is_zero() {
            return Err(ProcessorError::config("`period` must be greater than zero"));
        }
        let cache_limit = opt_usize(opts, "cache_limit")?.unwrap_or(crate::DEFAULT_CACHE_LIMIT);
        Ok(Box::new(RateProcessor::new(period, cache_limit)))
    }
}

#[cfg(test)]
mod tests {
    use ffwd_protocol::Event;
    use tokio::time::sleep;

    use super::*;

    #[derive(Default)]
    struct TestEmitter {
        metrics: Mutex<Vec<Metric>>,
    }

    impl Emitter for TestEmitter {
        fn emit_metric(&self, metric: Metric) {
            self.metrics.lock().push(metric);
        }

        fn emit_event(&self, _event: Event) {}
    }

    #[tokio::test]
    async fn test_emits_window_rates() {
        let emitter = Arc::new(TestEmitter::default());
        let cancel = CancellationToken::new();
        let mut processor = RateProcessor::new(Duration::from_millis(50), 10);
        processor.start(Arc::clone(&emitter) as Arc<dyn Emitter>, &cancel);

        processor.process(Metric::new("req", 1.0));
        processor.process(Metric::new("req", 2.0));

        sleep(Duration::from_millis(120)).await;
        cancel.cancel();

        let emitted = emitter.metrics.lock();
        assert!(!emitted.is_empty());
        assert_eq!(emitted[0].key, "req");
        // 3.0 accumulated over a 50ms window
        assert!((emitted[0].value - 60.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_window_clears_between_ticks() {
        let emitter = Arc::new(TestEmitter::default());
        let cancel = CancellationToken::new();
        let mut processor = RateProcessor::new(Duration::from_millis(30), 10);
        processor.start(Arc::clone(&emitter) as Arc<dyn Emitter>, &cancel);

        processor.process(Metric::new("req", 3.0));
        sleep(Duration::from_millis(120)).await;
        cancel.cancel();

        // Idle windows after the first emission produce nothing
        assert_eq!(emitter.metrics.lock().len(), 1);
    }

    #[test]
    fn test_capacity_drops_new_keys() {
        let mut processor = RateProcessor::new(DEFAULT_RATE_PERIOD, 1);
        processor.process(Metric::new("a", 1.0));
        processor.process(Metric::new("b", 1.0));

        let reporter = processor.reporter().unwrap();
        assert!(reporter
            .drain()
            .contains(&CounterValue::new("dropped_keys", 1)));
    }

    #[test]
    fn test_factory_rejects_zero_period() {
        let opts: ProcessorOpts = toml::from_str("period = 0").unwrap();
        assert!(RateFactory.create(&opts).is_err());
    }
}
