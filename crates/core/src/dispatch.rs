//! Core processor dispatcher
//!
//! Subscribed to the input channel. A metric whose `proc` field names a
//! loaded processor goes through that processor; anything else is forwarded
//! unchanged to the emitter. Events always pass straight through.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use ffwd_channel::{PluginChannel, Subscription};
use ffwd_metrics::Reporter;
use ffwd_processor::{Emitter, Processor};
use ffwd_protocol::Metric;

/// Routes input metrics to processors or straight to the emitter.
pub struct CoreProcessor {
    processors: Mutex<HashMap<&'static str, Box<dyn Processor>>>,
    emitter: Arc<dyn Emitter>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl CoreProcessor {
    /// Create a dispatcher over the loaded processors
    pub fn new(processors: Vec<Box<dyn Processor>>, emitter: Arc<dyn Emitter>) -> Self {
        let processors = processors
            .into_iter()
            .map(|p| (p.name(), p))
            .collect::<HashMap<_, _>>();
        Self {
            processors: Mutex::new(processors),
            emitter,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Number of loaded processors
    pub fn processor_count(&self) -> usize {
        self.processors.lock().len()
    }

    /// Collect reporters from the loaded processors
    pub fn reporters(&self) -> Vec<Arc<dyn Reporter>> {
        self.processors
            .lock()
            .values()
            .filter_map(|p| p.reporter())
            .collect()
    }

    /// Start every processor and subscribe to the input channel.
    pub fn start(self: &Arc<Self>, input: &PluginChannel, cancel: &CancellationToken) {
        {
            let mut processors = self.processors.lock();
            for processor in processors.values_mut() {
                processor.start(Arc::clone(&self.emitter), cancel);
            }
        }

        let mut subscriptions = self.subscriptions.lock();

        let this = Arc::clone(self);
        subscriptions.push(input.metric.subscribe(move |metric| {
            this.dispatch(metric.clone());
            Ok(())
        }));

        let this = Arc::clone(self);
        subscriptions.push(input.event.subscribe(move |event| {
            this.emitter.emit_event(event.clone());
            Ok(())
        }));
    }

    /// Route one metric.
    pub fn dispatch(&self, metric: Metric) {
        if let Some(name) = metric.proc.as_deref() {
            let mut processors = self.processors.lock();
            if let Some(processor) = processors.get_mut(name) {
                processor.process(metric);
                return;
            }
        }
        self.emitter.emit_metric(metric);
    }
}
