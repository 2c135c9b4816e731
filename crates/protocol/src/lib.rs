//! FFWD protocol - data model and wire codecs
//!
//! This crate defines the common event/metric model every other part of FFWD
//! speaks, plus the serialization seams between that model and the wire:
//!
//! - [`Event`] and [`Metric`] - the normalized telemetry records
//! - [`Handler`] - outbound serialization contract used by connect clients
//! - [`carbon`] - the carbon plaintext line codec
//! - [`JsonHandler`] / [`CarbonHandler`] - the built-in handlers

mod error;
mod event;
mod handler;
mod metric;

pub mod carbon;

pub use error::ProtocolError;
pub use event::Event;
pub use handler::{CarbonHandler, Handler, JsonHandler};
pub use metric::Metric;

/// Current epoch time in whole seconds.
///
/// Seconds resolution is all the wire formats carry, so this is the only
/// clock the protocol layer needs.
pub fn epoch_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
