//! FFWD processors - named metric aggregation
//!
//! A [`Processor`] is a named stateful transform: it consumes metrics routed
//! to it by the core dispatcher (via the metric's `proc` tag) and emits
//! derived metrics through the [`Emitter`] seam. Processors register as
//! factories in the [`ProcessorRegistry`], built once at startup.
//!
//! Two reference processors ship with the daemon:
//!
//! - [`count`](CountProcessor) - running per-key totals, emitted on every
//!   sample
//! - [`rate`](RateProcessor) - per-key rates over a periodic window

mod count;
mod error;
mod rate;
mod registry;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ffwd_metrics::Reporter;
use ffwd_protocol::{Event, Metric};

pub use count::{CountProcessor, DEFAULT_CACHE_LIMIT};
pub use error::ProcessorError;
pub use rate::{RateProcessor, DEFAULT_RATE_PERIOD};
pub use registry::{ProcessorFactory, ProcessorOpts, ProcessorRegistry};

/// Downstream seam processors emit into; implemented by the core emitter.
pub trait Emitter: Send + Sync {
    /// Emit a derived metric
    fn emit_metric(&self, metric: Metric);

    /// Emit a derived event
    fn emit_event(&self, event: Event);
}

/// A named stateful metric transform.
pub trait Processor: Send {
    /// Registry name of this processor
    fn name(&self) -> &'static str;

    /// Hand the processor its emitter; may arm periodic timers tied to
    /// `cancel`. Called exactly once, before any `process`.
    fn start(&mut self, emitter: Arc<dyn Emitter>, cancel: &CancellationToken);

    /// Consume one metric routed to this processor
    fn process(&mut self, metric: Metric);

    /// Counters for the statistics reporter, if the processor keeps any
    fn reporter(&self) -> Option<Arc<dyn Reporter>> {
        None
    }
}
