use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::sleep;

use ffwd_protocol::{CarbonHandler, JsonHandler};

use super::*;
use crate::peer::{Address, ProtocolFamily};

fn peer_for(port: u16) -> Peer {
    Peer::new(
        ProtocolFamily::Tcp,
        Address::Inet {
            host: "127.0.0.1".into(),
            port,
        },
    )
    .unwrap()
}

fn quick_reconnect() -> ReconnectPolicy {
    ReconnectPolicy {
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
    }
}

fn slow_reconnect() -> ReconnectPolicy {
    ReconnectPolicy {
        initial_delay: Duration::from_secs(60),
        max_delay: Duration::from_secs(60),
    }
}

/// Reserve a port with no listener behind it
async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

// =============================================================================
// Backoff policy
// =============================================================================

#[test]
fn test_backoff_doubles_until_capped() {
    let policy = ReconnectPolicy::default();
    let mut delay = policy.initial_delay;
    let mut schedule = Vec::new();
    for _ in 0..9 {
        schedule.push(delay.as_secs());
        delay = policy.next_delay(delay);
    }
    assert_eq!(schedule, vec![2, 4, 8, 16, 32, 64, 128, 256, 300]);
}

#[test]
fn test_config_defaults() {
    let config = ConnectConfig::default();
    assert_eq!(config.flush_period, Duration::from_secs(10));
    assert_eq!(config.outbound_limit, 1 << 20);
    assert_eq!(
        config.reconnect.initial_delay,
        ReconnectPolicy::DEFAULT_INITIAL_DELAY
    );
}

#[test]
fn test_zero_outbound_limit_rejected() {
    let config = ConnectConfig {
        outbound_limit: 0,
        ..Default::default()
    };
    let result = ConnectClient::new(peer_for(1), Arc::new(JsonHandler), config);
    assert!(result.is_err());
}

// =============================================================================
// Streaming mode
// =============================================================================

#[tokio::test]
async fn test_streaming_passthrough() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        let mut received = Vec::new();
        while received.len() < 3 {
            match lines.next_line().await.unwrap() {
                Some(line) => received.push(line),
                None => break,
            }
        }
        received
    });

    let config = ConnectConfig {
        flush_period: Duration::ZERO,
        outbound_limit: 1_000_000,
        ..Default::default()
    };
    let client = ConnectClient::new(peer_for(port), Arc::new(JsonHandler), config).unwrap();
    let output = ffwd_channel::PluginChannel::new("output");
    client.start(&output);

    wait_until(|| client.is_open()).await;

    for (key, value) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
        output.metric.publish(&ffwd_protocol::Metric::new(key, value));
    }

    let received = server.await.unwrap();
    assert_eq!(received.len(), 3);
    assert!(received[0].contains(r#""key":"a""#));
    assert!(received[1].contains(r#""key":"b""#));
    assert!(received[2].contains(r#""key":"c""#));

    let counters = client.counters().snapshot();
    assert_eq!(counters.sent_metrics, 3);
    assert_eq!(counters.dropped_metrics, 0);

    client.close();
}

#[tokio::test]
async fn test_drops_while_disconnected() {
    let port = refused_port().await;
    let config = ConnectConfig {
        flush_period: Duration::ZERO,
        reconnect: slow_reconnect(),
        ..Default::default()
    };
    let client = ConnectClient::new(peer_for(port), Arc::new(JsonHandler), config).unwrap();
    let output = ffwd_channel::PluginChannel::new("output");
    client.start(&output);

    for _ in 0..5 {
        output.event.publish(&ffwd_protocol::Event::new("e"));
    }

    let counters = client.counters().snapshot();
    assert_eq!(counters.dropped_events, 5);
    assert_eq!(counters.sent_events, 0);

    client.close();
}

#[tokio::test]
async fn test_serialize_error_counts_as_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _server = tokio::spawn(async move { listener.accept().await });

    let config = ConnectConfig {
        flush_period: Duration::ZERO,
        ..Default::default()
    };
    // Carbon cannot serialize events
    let client = ConnectClient::new(peer_for(port), Arc::new(CarbonHandler), config).unwrap();
    let output = ffwd_channel::PluginChannel::new("output");
    client.start(&output);

    wait_until(|| client.is_open()).await;

    output.event.publish(&ffwd_protocol::Event::new("e"));
    output.metric.publish(&ffwd_protocol::Metric::new("m", 1.0));

    wait_until(|| client.counters().snapshot().sent_metrics == 1).await;
    let counters = client.counters().snapshot();
    // The unserializable event is lost but still accounted for:
    // sent + dropped must match the two deliveries
    assert_eq!(counters.sent_events, 0);
    assert_eq!(counters.dropped_events, 1);
    assert_eq!(counters.dropped_metrics, 0);

    client.close();
}

#[tokio::test]
async fn test_failed_flush_drops_whole_batch() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _server = tokio::spawn(async move { listener.accept().await });

    let config = ConnectConfig {
        flush_period: Duration::from_millis(50),
        ..Default::default()
    };
    // A batch containing an event makes carbon's batch serialization fail
    let client = ConnectClient::new(peer_for(port), Arc::new(CarbonHandler), config).unwrap();
    let output = ffwd_channel::PluginChannel::new("output");
    client.start(&output);

    wait_until(|| client.is_open()).await;

    output.event.publish(&ffwd_protocol::Event::new("e"));
    output.metric.publish(&ffwd_protocol::Metric::new("m", 1.0));

    wait_until(|| client.counters().snapshot().failed_flushes == 1).await;
    let counters = client.counters().snapshot();
    assert_eq!(counters.dropped_events, 1);
    assert_eq!(counters.dropped_metrics, 1);
    assert_eq!(counters.sent_events, 0);
    assert_eq!(counters.sent_metrics, 0);
    assert_eq!(client.buffered(), (0, 0));

    client.close();
}

// =============================================================================
// Buffered mode
// =============================================================================

#[tokio::test]
async fn test_flush_batches_in_insertion_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        let mut received = Vec::new();
        while received.len() < 6 {
            match lines.next_line().await.unwrap() {
                Some(line) => received.push(line),
                None => break,
            }
        }
        received
    });

    let config = ConnectConfig {
        flush_period: Duration::from_millis(100),
        ..Default::default()
    };
    let client = ConnectClient::new(peer_for(port), Arc::new(JsonHandler), config).unwrap();
    let output = ffwd_channel::PluginChannel::new("output");
    client.start(&output);

    wait_until(|| client.is_open()).await;

    for key in ["m1", "m2", "m3", "m4"] {
        output.metric.publish(&ffwd_protocol::Metric::new(key, 1.0));
    }
    for key in ["e1", "e2"] {
        output.event.publish(&ffwd_protocol::Event::new(key));
    }

    let received = server.await.unwrap();
    // JSON batches render events first, then metrics, each in insertion order
    assert_eq!(received.len(), 6);
    assert!(received[0].contains("e1"));
    assert!(received[1].contains("e2"));
    assert!(received[2].contains("m1"));
    assert!(received[3].contains("m2"));
    assert!(received[4].contains("m3"));
    assert!(received[5].contains("m4"));

    let counters = client.counters().snapshot();
    assert_eq!(counters.sent_metrics, 4);
    assert_eq!(counters.sent_events, 2);
    assert_eq!(client.buffered(), (0, 0));

    client.close();
}

#[tokio::test]
async fn test_flush_drops_and_clears_when_not_writable() {
    let port = refused_port().await;
    let config = ConnectConfig {
        flush_period: Duration::from_millis(50),
        reconnect: slow_reconnect(),
        ..Default::default()
    };
    let client = ConnectClient::new(peer_for(port), Arc::new(JsonHandler), config).unwrap();
    let output = ffwd_channel::PluginChannel::new("output");
    client.start(&output);

    output.metric.publish(&ffwd_protocol::Metric::new("m1", 1.0));
    output.metric.publish(&ffwd_protocol::Metric::new("m2", 2.0));
    output.event.publish(&ffwd_protocol::Event::new("e1"));

    wait_until(|| client.counters().snapshot().dropped_metrics == 2).await;
    let counters = client.counters().snapshot();
    assert_eq!(counters.dropped_events, 1);
    assert_eq!(counters.sent_metrics, 0);
    assert_eq!(client.buffered(), (0, 0));

    client.close();
}

#[tokio::test]
async fn test_empty_flush_is_noop() {
    let port = refused_port().await;
    let config = ConnectConfig {
        flush_period: Duration::from_millis(20),
        reconnect: slow_reconnect(),
        ..Default::default()
    };
    let client = ConnectClient::new(peer_for(port), Arc::new(JsonHandler), config).unwrap();
    let output = ffwd_channel::PluginChannel::new("output");
    client.start(&output);

    sleep(Duration::from_millis(100)).await;
    let counters = client.counters().snapshot();
    assert_eq!(counters, ConnectCountersSnapshot::default());

    client.close();
}

// =============================================================================
// Reconnect behavior
// =============================================================================

#[tokio::test]
async fn test_reconnects_after_peer_close_and_resets_backoff() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepts = Arc::new(AtomicUsize::new(0));

    let accept_count = Arc::clone(&accepts);
    tokio::spawn(async move {
        // First peer drops immediately, second stays up
        let (first, _) = listener.accept().await.unwrap();
        accept_count.fetch_add(1, Ordering::Relaxed);
        drop(first);

        let (_second, _) = listener.accept().await.unwrap();
        accept_count.fetch_add(1, Ordering::Relaxed);
        std::future::pending::<()>().await;
    });

    let config = ConnectConfig {
        flush_period: Duration::ZERO,
        reconnect: quick_reconnect(),
        ..Default::default()
    };
    let client = ConnectClient::new(peer_for(port), Arc::new(JsonHandler), config).unwrap();
    let output = ffwd_channel::PluginChannel::new("output");
    client.start(&output);

    wait_until(|| accepts.load(Ordering::Relaxed) == 2).await;
    wait_until(|| client.is_open()).await;

    // Success resets the backoff to its initial value
    assert_eq!(client.reconnect_delay(), quick_reconnect().initial_delay);

    client.close();
}

#[tokio::test]
async fn test_close_suppresses_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepts = Arc::new(AtomicUsize::new(0));

    let accept_count = Arc::clone(&accepts);
    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            accept_count.fetch_add(1, Ordering::Relaxed);
            held.push(stream);
        }
    });

    let config = ConnectConfig {
        flush_period: Duration::ZERO,
        reconnect: quick_reconnect(),
        ..Default::default()
    };
    let client = ConnectClient::new(peer_for(port), Arc::new(JsonHandler), config).unwrap();
    let output = ffwd_channel::PluginChannel::new("output");
    client.start(&output);

    wait_until(|| client.is_open()).await;
    client.close();
    client.close();

    wait_until(|| !client.is_open()).await;

    // Well past several backoff periods: still exactly one connection
    sleep(Duration::from_millis(300)).await;
    assert_eq!(accepts.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_accounting_matches_deliveries() {
    // sent + dropped must equal the number of delivered items
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        while lines.next_line().await.unwrap_or(None).is_some() {}
    });

    let config = ConnectConfig {
        flush_period: Duration::ZERO,
        reconnect: slow_reconnect(),
        ..Default::default()
    };
    let client = ConnectClient::new(peer_for(port), Arc::new(JsonHandler), config).unwrap();
    let output = ffwd_channel::PluginChannel::new("output");

    // Deliver some before the connection opens, some after
    client.start(&output);
    for i in 0..4 {
        output.metric.publish(&ffwd_protocol::Metric::new("m", i as f64));
    }
    wait_until(|| client.is_open()).await;
    for i in 0..6 {
        output.metric.publish(&ffwd_protocol::Metric::new("m", i as f64));
    }

    wait_until(|| {
        let c = client.counters().snapshot();
        c.sent_metrics + c.dropped_metrics == 10
    })
    .await;

    client.close();
}
