//! Single-topic pub/sub channel
//!
//! # Design
//!
//! - Publishing fans out **synchronously, in subscription order, on the
//!   calling task**; there is no queueing between publisher and subscriber.
//! - A failing subscriber never suppresses delivery to the rest: the error
//!   is logged and fan-out continues.
//! - The subscriber list is snapshotted before invocation, so callbacks may
//!   subscribe or unsubscribe reentrantly without deadlocking.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

/// Error type subscribers may return; publishing isolates it per subscriber.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

type SubscriberFn<T> = Arc<dyn Fn(&T) -> Result<(), SubscriberError> + Send + Sync>;

struct ChannelInner<T> {
    id: String,
    closed: AtomicBool,
    next_token: AtomicU64,
    subscribers: RwLock<Vec<(u64, SubscriberFn<T>)>>,
}

/// Single-topic pub/sub with synchronous fan-out.
///
/// The channel id is fixed at construction and shows up in log context and
/// the debug monitor.
pub struct Channel<T> {
    inner: Arc<ChannelInner<T>>,
}

impl<T: 'static> Channel<T> {
    /// Create a channel with a stable id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                id: id.into(),
                closed: AtomicBool::new(false),
                next_token: AtomicU64::new(0),
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Channel id
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Append a subscriber; it receives every subsequent publish until
    /// unsubscribed or the channel is closed.
    pub fn subscribe<F>(&self, subscriber: F) -> Subscription
    where
        F: Fn(&T) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .write()
            .push((token, Arc::new(subscriber)));

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.subscribers.write().retain(|(t, _)| *t != token);
            }
        })
    }

    /// Deliver an item to every current subscriber, in subscription order.
    ///
    /// A subscriber returning an error is logged as
    /// `"{id}: Subscription failed"` and the remaining subscribers still
    /// receive the item. Publishing on a closed or subscriber-less channel
    /// is a no-op.
    pub fn publish(&self, item: &T) {
        if self.inner.closed.load(Ordering::Relaxed) {
            return;
        }

        // Snapshot so subscriber callbacks can touch the list reentrantly
        let subscribers: Vec<SubscriberFn<T>> = self
            .inner
            .subscribers
            .read()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();

        for subscriber in subscribers {
            if let Err(e) = subscriber(item) {
                tracing::error!(error = %e, "{}: Subscription failed", self.inner.id);
            }
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Drop every subscription and turn further publishes into no-ops.
    ///
    /// Outstanding [`Subscription`] handles stay safe to use.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Relaxed);
        self.inner.subscribers.write().clear();
    }

    /// Whether the channel has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("subscribers", &self.inner.subscribers.read().len())
            .finish()
    }
}

/// Handle returned by [`Channel::subscribe`].
///
/// `unsubscribe` removes exactly that subscriber, is idempotent, and is safe
/// to call after the channel has been closed or dropped. Dropping the handle
/// does NOT unsubscribe.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Remove the subscriber this handle was returned for
    pub fn unsubscribe(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "channel_test.rs"]
mod channel_test;
