//! PluginChannel - the (event, metric) topic pair with lifecycle
//!
//! Plugins and the core never see raw [`Channel`]s; they hold a
//! `PluginChannel` with one topic per record type and register lifecycle
//! callbacks on it. `start` walks the starting callbacks in registration
//! order; `stop` walks the stopping callbacks in reverse, then drops every
//! subscription so late publishes are no-ops.

use parking_lot::Mutex;

use ffwd_protocol::{Event, Metric};

use crate::channel::{Channel, SubscriberError};

/// Lifecycle states of a [`PluginChannel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Initial,
    Starting,
    Started,
    Stopping,
    Stopped,
}

type LifecycleFn = Box<dyn FnOnce() -> Result<(), SubscriberError> + Send>;

struct Lifecycle {
    state: LifecycleState,
    starting: Vec<LifecycleFn>,
    stopping: Vec<LifecycleFn>,
}

/// Two-topic channel (events, metrics) plus lifecycle hooks.
pub struct PluginChannel {
    id: String,
    /// Event topic
    pub event: Channel<Event>,
    /// Metric topic
    pub metric: Channel<Metric>,
    lifecycle: Mutex<Lifecycle>,
}

impl PluginChannel {
    /// Create a channel pair with a stable id; the topics get
    /// `{id}.event` / `{id}.metric` ids.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            event: Channel::new(format!("{id}.event")),
            metric: Channel::new(format!("{id}.metric")),
            id,
            lifecycle: Mutex::new(Lifecycle {
                state: LifecycleState::Initial,
                starting: Vec::new(),
                stopping: Vec::new(),
            }),
        }
    }

    /// Channel id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.lock().state
    }

    /// Register a one-shot callback fired by [`PluginChannel::start`]
    pub fn on_starting<F>(&self, callback: F)
    where
        F: FnOnce() -> Result<(), SubscriberError> + Send + 'static,
    {
        self.lifecycle.lock().starting.push(Box::new(callback));
    }

    /// Register a one-shot callback fired by [`PluginChannel::stop`]
    pub fn on_stopping<F>(&self, callback: F)
    where
        F: FnOnce() -> Result<(), SubscriberError> + Send + 'static,
    {
        self.lifecycle.lock().stopping.push(Box::new(callback));
    }

    /// Walk the starting callbacks in registration order.
    ///
    /// A no-op unless the channel is in its initial state. Callback errors
    /// are isolated exactly like subscriber errors.
    pub fn start(&self) {
        let callbacks = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != LifecycleState::Initial {
                return;
            }
            lifecycle.state = LifecycleState::Starting;
            std::mem::take(&mut lifecycle.starting)
        };

        self.run_callbacks(callbacks, "starting");
        self.lifecycle.lock().state = LifecycleState::Started;
    }

    /// Walk the stopping callbacks in reverse registration order, then drop
    /// all subscriptions. Further publishes are no-ops.
    ///
    /// A no-op unless the channel is started.
    pub fn stop(&self) {
        let callbacks = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != LifecycleState::Started {
                return;
            }
            lifecycle.state = LifecycleState::Stopping;
            let mut stopping = std::mem::take(&mut lifecycle.stopping);
            stopping.reverse();
            stopping
        };

        self.run_callbacks(callbacks, "stopping");

        self.event.close();
        self.metric.close();
        self.lifecycle.lock().state = LifecycleState::Stopped;
    }

    fn run_callbacks(&self, callbacks: Vec<LifecycleFn>, phase: &str) {
        for callback in callbacks {
            if let Err(e) = callback() {
                tracing::error!(error = %e, "{}: {} callback failed", self.id, phase);
            }
        }
    }
}

impl std::fmt::Debug for PluginChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginChannel")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
#[path = "plugin_test.rs"]
mod plugin_test;
