//! Connect client - the reconnecting outbound socket owner
//!
//! One client owns one peer's outbound traffic for its whole lifetime. A
//! single writer task dials the peer, drains the outbound byte queue into
//! the socket, and on disconnection walks the reconnect backoff; the single
//! sleep inside that task is the reconnect timer, so at most one is ever
//! armed and `close()` cancels it along with everything else.
//!
//! # Admission
//!
//! `writable := open && outbound_bytes_queued < outbound_limit`, where
//! `outbound_bytes_queued` counts bytes enqueued for the writer task but not
//! yet handed to the socket. Items arriving while not writable are dropped
//! and counted; nothing is ever re-queued. A serialization failure loses
//! the item the same way: logged, never re-queued, and counted as dropped,
//! so sent + dropped always matches the number of deliveries.
//!
//! # Modes
//!
//! - `flush_period == 0` (streaming): every published item is serialized and
//!   written individually, in publish order.
//! - `flush_period > 0` (buffered): items accumulate in per-type buffers; a
//!   periodic flush serializes the whole batch in one write. The buffers are
//!   emptied on every flush, success or not.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use ffwd_channel::{PluginChannel, Subscription};
use ffwd_config::PluginConfig;
use ffwd_metrics::{CounterValue, Reporter};
use ffwd_protocol::{Event, Handler, Metric};

use crate::{IoStream, Peer, TransportError};

/// Reconnect backoff behavior.
///
/// The delay starts at `initial_delay`, doubles on each failed attempt, and
/// is clamped at `max_delay` (the upstream behavior is uncapped; five
/// minutes is this implementation's ceiling). A successful connect resets
/// the delay to its initial value.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// First reconnect delay
    pub initial_delay: Duration,

    /// Backoff ceiling
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Default first delay (2s)
    pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(2);

    /// Default ceiling (5 minutes)
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

    /// The delay following a failed attempt at `current`
    pub fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Self::DEFAULT_INITIAL_DELAY,
            max_delay: Self::DEFAULT_MAX_DELAY,
        }
    }
}

/// Connect client construction options.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Flush period; zero selects streaming mode
    pub flush_period: Duration,

    /// Outbound admission limit in bytes
    pub outbound_limit: usize,

    /// Bound on a single dial attempt
    pub connect_timeout: Duration,

    /// Reconnect backoff
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            flush_period: Duration::from_secs(ffwd_config::DEFAULT_FLUSH_PERIOD_SECS),
            outbound_limit: ffwd_config::DEFAULT_OUTBOUND_LIMIT,
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ConnectConfig {
    /// Take flush period and outbound limit from a plugin config entry
    pub fn from_plugin_config(config: &PluginConfig) -> Self {
        Self {
            flush_period: Duration::from_secs(config.flush_period),
            outbound_limit: config.outbound_limit,
            ..Self::default()
        }
    }
}

/// Per-client counters, drained through the [`Reporter`] interface.
#[derive(Debug)]
pub struct ConnectCounters {
    id: String,
    sent_events: AtomicU64,
    sent_metrics: AtomicU64,
    dropped_events: AtomicU64,
    dropped_metrics: AtomicU64,
    failed_flushes: AtomicU64,
}

/// Point-in-time counter values, without resetting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectCountersSnapshot {
    pub sent_events: u64,
    pub sent_metrics: u64,
    pub dropped_events: u64,
    pub dropped_metrics: u64,
    pub failed_flushes: u64,
}

impl ConnectCounters {
    fn new(id: String) -> Self {
        Self {
            id,
            sent_events: AtomicU64::new(0),
            sent_metrics: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
            dropped_metrics: AtomicU64::new(0),
            failed_flushes: AtomicU64::new(0),
        }
    }

    /// Read the current window without resetting it
    pub fn snapshot(&self) -> ConnectCountersSnapshot {
        ConnectCountersSnapshot {
            sent_events: self.sent_events.load(Ordering::Relaxed),
            sent_metrics: self.sent_metrics.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            dropped_metrics: self.dropped_metrics.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
        }
    }
}

impl Reporter for ConnectCounters {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_active(&self) -> bool {
        let s = self.snapshot();
        s.sent_events + s.sent_metrics + s.dropped_events + s.dropped_metrics + s.failed_flushes
            != 0
    }

    fn drain(&self) -> Vec<CounterValue> {
        vec![
            CounterValue::new("sent_events", self.sent_events.swap(0, Ordering::Relaxed)),
            CounterValue::new("sent_metrics", self.sent_metrics.swap(0, Ordering::Relaxed)),
            CounterValue::new(
                "dropped_events",
                self.dropped_events.swap(0, Ordering::Relaxed),
            ),
            CounterValue::new(
                "dropped_metrics",
                self.dropped_metrics.swap(0, Ordering::Relaxed),
            ),
            CounterValue::new(
                "failed_flushes",
                self.failed_flushes.swap(0, Ordering::Relaxed),
            ),
        ]
    }
}

#[derive(Default)]
struct Buffers {
    events: Vec<Event>,
    metrics: Vec<Metric>,
}

struct ClientInner {
    peer: Peer,
    handler: Arc<dyn Handler>,
    config: ConnectConfig,
    open: AtomicBool,
    closing: AtomicBool,
    queued_bytes: AtomicUsize,
    sender: mpsc::UnboundedSender<Bytes>,
    counters: Arc<ConnectCounters>,
    buffers: Mutex<Buffers>,
    reconnect_delay: Mutex<Duration>,
    cancel: CancellationToken,
}

enum PumpEnd {
    Closing,
    Unbind,
    SenderDropped,
}

impl ClientInner {
    fn writable(&self) -> bool {
        self.open.load(Ordering::Relaxed)
            && self.queued_bytes.load(Ordering::Relaxed) < self.config.outbound_limit
    }

    /// Hand serialized bytes to the writer task, keeping the queued-bytes
    /// accounting exact. Returns false when the writer is gone.
    fn enqueue(&self, bytes: Bytes) -> bool {
        let len = bytes.len();
        self.queued_bytes.fetch_add(len, Ordering::Relaxed);
        if self.sender.send(bytes).is_err() {
            self.queued_bytes.fetch_sub(len, Ordering::Relaxed);
            return false;
        }
        true
    }

    fn handle_event(&self, event: &Event) {
        if !self.writable() {
            self.counters.dropped_events.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.handler.serialize_event(event) {
            Ok(bytes) => {
                if self.enqueue(bytes) {
                    self.counters.sent_events.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.dropped_events.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                // The item was delivered to us, so the loss must be counted
                // for sent + dropped to keep matching deliveries
                self.counters.dropped_events.fetch_add(1, Ordering::Relaxed);
                tracing::error!(peer = %self.peer, error = %e, "Failed to handle event");
            }
        }
    }

    fn handle_metric(&self, metric: &Metric) {
        if !self.writable() {
            self.counters.dropped_metrics.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.handler.serialize_metric(metric) {
            Ok(bytes) => {
                if self.enqueue(bytes) {
                    self.counters.sent_metrics.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.dropped_metrics.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                self.counters.dropped_metrics.fetch_add(1, Ordering::Relaxed);
                tracing::error!(peer = %self.peer, error = %e, "Failed to handle metric");
            }
        }
    }

    fn buffer_event(&self, event: &Event) {
        self.buffers.lock().events.push(event.clone());
    }

    fn buffer_metric(&self, metric: &Metric) {
        self.buffers.lock().metrics.push(metric.clone());
    }

    /// One flush cycle. The buffers are taken up front, so they are empty
    /// after every invocation no matter which path runs.
    fn flush(&self) {
        let (events, metrics) = {
            let mut buffers = self.buffers.lock();
            (
                std::mem::take(&mut buffers.events),
                std::mem::take(&mut buffers.metrics),
            )
        };

        if events.is_empty() && metrics.is_empty() {
            return;
        }

        if !self.writable() {
            self.counters
                .dropped_events
                .fetch_add(events.len() as u64, Ordering::Relaxed);
            self.counters
                .dropped_metrics
                .fetch_add(metrics.len() as u64, Ordering::Relaxed);
            return;
        }

        match self.handler.serialize_batch(&events, &metrics) {
            Ok(bytes) => {
                if self.enqueue(bytes) {
                    self.counters
                        .sent_events
                        .fetch_add(events.len() as u64, Ordering::Relaxed);
                    self.counters
                        .sent_metrics
                        .fetch_add(metrics.len() as u64, Ordering::Relaxed);
                } else {
                    self.counters
                        .dropped_events
                        .fetch_add(events.len() as u64, Ordering::Relaxed);
                    self.counters
                        .dropped_metrics
                        .fetch_add(metrics.len() as u64, Ordering::Relaxed);
                }
            }
            Err(e) => {
                // The whole batch is discarded with the buffers
                self.counters
                    .dropped_events
                    .fetch_add(events.len() as u64, Ordering::Relaxed);
                self.counters
                    .dropped_metrics
                    .fetch_add(metrics.len() as u64, Ordering::Relaxed);
                self.counters.failed_flushes.fetch_add(1, Ordering::Relaxed);
                tracing::error!(peer = %self.peer, error = %e, "Failed to flush");
            }
        }
    }

    /// Writer task: dial, drain, reconnect.
    async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Bytes>) {
        loop {
            if self.closing.load(Ordering::Relaxed) {
                break;
            }

            let dialed = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = tokio::time::timeout(self.config.connect_timeout, self.peer.dial()) => {
                    result.unwrap_or_else(|_| {
                        Err(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            "connect timed out",
                        ))
                    })
                }
            };

            match dialed {
                Ok(stream) => {
                    *self.reconnect_delay.lock() = self.config.reconnect.initial_delay;
                    self.open.store(true, Ordering::Relaxed);
                    tracing::info!(peer = %self.peer, "connected");

                    let end = self.pump(stream, &mut rx).await;
                    self.open.store(false, Ordering::Relaxed);

                    match end {
                        PumpEnd::Closing => {
                            tracing::info!(peer = %self.peer, "disconnected");
                            break;
                        }
                        PumpEnd::SenderDropped => break,
                        PumpEnd::Unbind => {
                            let delay = *self.reconnect_delay.lock();
                            tracing::warn!(
                                peer = %self.peer,
                                delay_secs = delay.as_secs_f64(),
                                "disconnected, reconnecting"
                            );
                        }
                    }
                }
                Err(e) => {
                    if self.closing.load(Ordering::Relaxed) {
                        break;
                    }
                    let delay = *self.reconnect_delay.lock();
                    tracing::warn!(
                        peer = %self.peer,
                        error = %e,
                        delay_secs = delay.as_secs_f64(),
                        "connect failed, retrying"
                    );
                }
            }

            self.discard_queued(&mut rx);

            let delay = *self.reconnect_delay.lock();
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let mut current = self.reconnect_delay.lock();
            *current = self.config.reconnect.next_delay(*current);
        }

        self.open.store(false, Ordering::Relaxed);
        rx.close();
        self.discard_queued(&mut rx);
    }

    /// Drain the queue into the socket until it breaks or we are told to
    /// stop. The read half only watches for the peer going away; payload
    /// bytes arriving on an outbound link are discarded.
    async fn pump(
        &self,
        stream: Box<dyn IoStream>,
        rx: &mut mpsc::UnboundedReceiver<Bytes>,
    ) -> PumpEnd {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut probe = [0u8; 1024];

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return PumpEnd::Closing,
                read = reader.read(&mut probe) => match read {
                    Ok(0) | Err(_) => return PumpEnd::Unbind,
                    Ok(_) => {}
                },
                message = rx.recv() => match message {
                    Some(bytes) => {
                        let result = writer.write_all(&bytes).await;
                        self.queued_bytes.fetch_sub(bytes.len(), Ordering::Relaxed);
                        if let Err(e) = result {
                            tracing::debug!(peer = %self.peer, error = %e, "write failed");
                            return PumpEnd::Unbind;
                        }
                    }
                    None => return PumpEnd::SenderDropped,
                },
            }
        }
    }

    /// Drop anything still queued so the admission counter stays exact
    /// across reconnects.
    fn discard_queued(&self, rx: &mut mpsc::UnboundedReceiver<Bytes>) {
        while let Ok(bytes) = rx.try_recv() {
            self.queued_bytes.fetch_sub(bytes.len(), Ordering::Relaxed);
        }
    }
}

/// The reconnecting outbound client.
///
/// Construct with [`ConnectClient::new`], wire it to the output channel with
/// [`ConnectClient::start`], and tear it down with [`ConnectClient::close`]
/// (the supervisor's shutdown hook does the latter for every client).
pub struct ConnectClient {
    inner: Arc<ClientInner>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
    subscriptions: Mutex<Vec<Subscription>>,
    started: AtomicBool,
}

impl ConnectClient {
    /// Create a client for one peer.
    ///
    /// Buffered vs streaming mode is fixed here by `config.flush_period`.
    pub fn new(
        peer: Peer,
        handler: Arc<dyn Handler>,
        config: ConnectConfig,
    ) -> Result<Self, TransportError> {
        if config.outbound_limit == 0 {
            return Err(TransportError::invalid_endpoint(
                "outbound_limit must be greater than zero",
            ));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let id = format!("{peer}/{}", handler.name());
        let initial_delay = config.reconnect.initial_delay;

        Ok(Self {
            inner: Arc::new(ClientInner {
                peer,
                handler,
                config,
                open: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                queued_bytes: AtomicUsize::new(0),
                sender,
                counters: Arc::new(ConnectCounters::new(id)),
                buffers: Mutex::new(Buffers::default()),
                reconnect_delay: Mutex::new(initial_delay),
                cancel: CancellationToken::new(),
            }),
            receiver: Mutex::new(Some(receiver)),
            subscriptions: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// The peer this client owns
    pub fn peer(&self) -> &Peer {
        &self.inner.peer
    }

    /// Whether the TCP session is currently established
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Relaxed)
    }

    /// The delay the next reconnect would wait
    pub fn reconnect_delay(&self) -> Duration {
        *self.inner.reconnect_delay.lock()
    }

    /// Buffered item counts (events, metrics); always (0, 0) in streaming
    /// mode and right after any flush
    pub fn buffered(&self) -> (usize, usize) {
        let buffers = self.inner.buffers.lock();
        (buffers.events.len(), buffers.metrics.len())
    }

    /// This client's counters
    pub fn counters(&self) -> Arc<ConnectCounters> {
        Arc::clone(&self.inner.counters)
    }

    /// This client's counters as a reporter
    pub fn reporter(&self) -> Arc<dyn Reporter> {
        Arc::clone(&self.inner.counters) as Arc<dyn Reporter>
    }

    /// Begin connecting and subscribe to the output channel.
    ///
    /// Idempotent; only the first call takes effect.
    pub fn start(&self, output: &PluginChannel) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(receiver) = self.receiver.lock().take() else {
            return;
        };

        tokio::spawn(Arc::clone(&self.inner).run(receiver));

        let mut subscriptions = self.subscriptions.lock();
        if self.inner.config.flush_period.is_zero() {
            let inner = Arc::clone(&self.inner);
            subscriptions.push(output.event.subscribe(move |event| {
                inner.handle_event(event);
                Ok(())
            }));
            let inner = Arc::clone(&self.inner);
            subscriptions.push(output.metric.subscribe(move |metric| {
                inner.handle_metric(metric);
                Ok(())
            }));
        } else {
            let inner = Arc::clone(&self.inner);
            subscriptions.push(output.event.subscribe(move |event| {
                inner.buffer_event(event);
                Ok(())
            }));
            let inner = Arc::clone(&self.inner);
            subscriptions.push(output.metric.subscribe(move |metric| {
                inner.buffer_metric(metric);
                Ok(())
            }));

            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                let period = inner.config.flush_period;
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = inner.cancel.cancelled() => break,
                        _ = ticker.tick() => inner.flush(),
                    }
                }
            });
        }
    }

    /// Tear the client down: close the socket and suppress any future
    /// reconnect. Idempotent.
    pub fn close(&self) {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(peer = %self.inner.peer, "closing");
        self.inner.cancel.cancel();
        for subscription in self.subscriptions.lock().drain(..) {
            subscription.unsubscribe();
        }
    }
}

impl std::fmt::Debug for ConnectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectClient")
            .field("peer", &self.inner.peer.to_string())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
#[path = "connect_test.rs"]
mod connect_test;
