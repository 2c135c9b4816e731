//! FFWD channel - the in-process event/metric bus
//!
//! Everything inside the daemon talks through channels: inbound connections
//! publish onto the input channel, the core pipeline republishes onto the
//! output channel, and every sink subscribes there.
//!
//! - [`Channel`] - single-topic pub/sub with synchronous fan-out and
//!   per-subscriber error isolation
//! - [`Subscription`] - removable, idempotent subscriber handle
//! - [`PluginChannel`] - the (event, metric) topic pair with lifecycle hooks

mod channel;
mod plugin;

pub use channel::{Channel, SubscriberError, Subscription};
pub use plugin::{LifecycleState, PluginChannel};
