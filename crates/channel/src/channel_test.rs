use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::*;

#[test]
fn test_publish_in_subscription_order() {
    let channel = Channel::<u32>::new("test");
    let seen = Arc::new(Mutex::new(Vec::new()));

    for tag in ["a", "b", "c"] {
        let seen = Arc::clone(&seen);
        channel.subscribe(move |item: &u32| {
            seen.lock().push((tag, *item));
            Ok(())
        });
    }

    channel.publish(&1);
    channel.publish(&2);

    let seen = seen.lock();
    assert_eq!(
        *seen,
        vec![("a", 1), ("b", 1), ("c", 1), ("a", 2), ("b", 2), ("c", 2)]
    );
}

#[test]
fn test_failing_subscriber_does_not_suppress_others() {
    let channel = Channel::<u32>::new("test");
    let delivered = Arc::new(AtomicUsize::new(0));

    channel.subscribe(|_: &u32| Err("boom".into()));

    let counter = Arc::clone(&delivered);
    channel.subscribe(move |_: &u32| {
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });

    channel.publish(&1);
    channel.publish(&2);

    assert_eq!(delivered.load(Ordering::Relaxed), 2);
}

#[test]
fn test_unsubscribe_removes_exactly_one() {
    let channel = Channel::<u32>::new("test");
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&first);
    let sub = channel.subscribe(move |_: &u32| {
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });

    let counter = Arc::clone(&second);
    channel.subscribe(move |_: &u32| {
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });

    channel.publish(&1);
    sub.unsubscribe();
    channel.publish(&2);

    assert_eq!(first.load(Ordering::Relaxed), 1);
    assert_eq!(second.load(Ordering::Relaxed), 2);
}

#[test]
fn test_unsubscribe_is_idempotent() {
    let channel = Channel::<u32>::new("test");
    let sub = channel.subscribe(|_: &u32| Ok(()));

    assert_eq!(channel.subscriber_count(), 1);
    sub.unsubscribe();
    sub.unsubscribe();
    assert_eq!(channel.subscriber_count(), 0);
}

#[test]
fn test_unsubscribe_after_close_is_safe() {
    let channel = Channel::<u32>::new("test");
    let sub = channel.subscribe(|_: &u32| Ok(()));

    channel.close();
    sub.unsubscribe();
}

#[test]
fn test_unsubscribe_after_channel_dropped_is_safe() {
    let channel = Channel::<u32>::new("test");
    let sub = channel.subscribe(|_: &u32| Ok(()));

    drop(channel);
    sub.unsubscribe();
}

#[test]
fn test_publish_without_subscribers_is_noop() {
    let channel = Channel::<u32>::new("test");
    channel.publish(&1);

    let sub = channel.subscribe(|_: &u32| Ok(()));
    sub.unsubscribe();
    channel.publish(&2);
}

#[test]
fn test_publish_after_close_is_noop() {
    let channel = Channel::<u32>::new("test");
    let delivered = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&delivered);
    channel.subscribe(move |_: &u32| {
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });

    channel.close();
    channel.publish(&1);

    assert_eq!(delivered.load(Ordering::Relaxed), 0);
    assert!(channel.is_closed());
}

#[test]
fn test_reentrant_unsubscribe_from_callback() {
    let channel = Arc::new(Channel::<u32>::new("test"));
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

    let slot_in_cb = Arc::clone(&slot);
    let sub = channel.subscribe(move |_: &u32| {
        if let Some(sub) = slot_in_cb.lock().take() {
            sub.unsubscribe();
        }
        Ok(())
    });
    *slot.lock() = Some(sub);

    // First publish removes the subscriber from inside its own callback
    channel.publish(&1);
    assert_eq!(channel.subscriber_count(), 0);
    channel.publish(&2);
}
