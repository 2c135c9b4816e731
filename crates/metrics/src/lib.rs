//! FFWD metrics - reporter plumbing and the statistics aggregator
//!
//! Components that count things (connect clients, processors) expose a
//! [`Reporter`]; the [`Statistics`] task drains active reporters on a
//! periodic timer into structured log lines and, optionally, back into the
//! input channel as metrics.

mod reporter;
mod statistics;

pub use reporter::{CounterValue, Reporter};
pub use statistics::Statistics;
