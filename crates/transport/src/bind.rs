//! Bind servers - inbound socket ownership
//!
//! The [`BindServer`] accepts stream connections and runs one
//! [`Connection`](crate::Connection) per peer on its own task. The
//! [`DatagramServer`] covers the udp families, feeding each datagram's lines
//! straight to the frame decoder.
//!
//! Binding itself goes through the [`Retrier`]: a busy port is retried with
//! exponential backoff (each attempt logged at warn), and the configured
//! timeout bounds the whole retry budget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    BindEndpoint, ConnectionFactory, FrameDecoder, RetryConfig, Retrier, TransportError,
};

/// Counters shared by both server kinds.
#[derive(Debug, Default)]
pub struct BindMetrics {
    /// Currently connected peers (stream servers only)
    pub connections_active: AtomicU64,
    /// Total accepted peers
    pub connections_total: AtomicU64,
    /// Datagrams or connections that errored
    pub errors: AtomicU64,
}

impl BindMetrics {
    /// Create zeroed metrics
    pub const fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    #[inline]
    fn connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of current values
    pub fn snapshot(&self) -> BindMetricsSnapshot {
        BindMetricsSnapshot {
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of bind metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct BindMetricsSnapshot {
    pub connections_active: u64,
    pub connections_total: u64,
    pub errors: u64,
}

/// Accepting stream server; one [`Connection`](crate::Connection) per peer.
pub struct BindServer {
    endpoint: BindEndpoint,
    factory: Arc<dyn ConnectionFactory>,
    retry: RetryConfig,
    metrics: Arc<BindMetrics>,
    local_addr: Mutex<Option<std::net::SocketAddr>>,
}

impl BindServer {
    /// Create a server for an endpoint
    pub fn new(
        endpoint: BindEndpoint,
        factory: Arc<dyn ConnectionFactory>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            endpoint,
            factory,
            retry,
            metrics: Arc::new(BindMetrics::new()),
            local_addr: Mutex::new(None),
        }
    }

    /// Server metrics
    pub fn metrics(&self) -> &BindMetrics {
        &self.metrics
    }

    /// Bound address once listening (tcp only; useful with port 0)
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        *self.local_addr.lock()
    }

    /// Bind (with retry) and start accepting until cancellation.
    ///
    /// Returns once the listener is up; accepting continues on its own task.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), TransportError> {
        let endpoint = self.endpoint.clone();
        let retrier = Retrier::new(self.retry.clone());

        let listener = retrier
            .run(
                || {
                    let endpoint = endpoint.clone();
                    async move {
                        endpoint
                            .bind_stream()
                            .await
                            .map_err(|source| TransportError::Bind {
                                address: endpoint.to_string(),
                                source,
                            })
                    }
                },
                |attempt, error, delay| {
                    tracing::warn!(
                        address = %endpoint,
                        attempt,
                        error = %error,
                        retry_in_secs = delay.as_secs_f64(),
                        "bind failed, retrying"
                    );
                },
            )
            .await?;

        *self.local_addr.lock() = listener.local_addr();
        tracing::info!(address = %self.endpoint, "listening");

        let factory = Arc::clone(&self.factory);
        let metrics = Arc::clone(&self.metrics);
        let endpoint = self.endpoint.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            metrics.connection_opened();
                            let connection = factory.connection();
                            let metrics = Arc::clone(&metrics);
                            tokio::spawn(async move {
                                if let Err(e) = connection.run(stream, peer.clone()).await {
                                    metrics.error();
                                    tracing::debug!(peer = %peer, error = %e, "connection error");
                                }
                                metrics.connection_closed();
                            });
                        }
                        Err(e) => {
                            metrics.error();
                            tracing::warn!(address = %endpoint, error = %e, "accept error");
                        }
                    }
                }
            }
            tracing::info!(address = %endpoint, "stopped listening");
        });

        Ok(())
    }
}

/// Datagram server for the udp families.
///
/// Each datagram is split on newlines and every line handed to the decoder;
/// malformed lines are logged and dropped without affecting the rest of the
/// datagram.
pub struct DatagramServer {
    endpoint: BindEndpoint,
    decoder: Arc<dyn FrameDecoder>,
    retry: RetryConfig,
    metrics: Arc<BindMetrics>,
    local_addr: Mutex<Option<std::net::SocketAddr>>,
}

/// Largest accepted datagram (64 KiB, the UDP maximum)
const MAX_DATAGRAM_BYTES: usize = 64 * 1024;

impl DatagramServer {
    /// Create a server for an endpoint
    pub fn new(
        endpoint: BindEndpoint,
        decoder: Arc<dyn FrameDecoder>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            endpoint,
            decoder,
            retry,
            metrics: Arc::new(BindMetrics::new()),
            local_addr: Mutex::new(None),
        }
    }

    /// Server metrics
    pub fn metrics(&self) -> &BindMetrics {
        &self.metrics
    }

    /// Bound address once listening (udp only; useful with port 0)
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        *self.local_addr.lock()
    }

    /// Bind (with retry) and start receiving until cancellation.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), TransportError> {
        let endpoint = self.endpoint.clone();
        let retrier = Retrier::new(self.retry.clone());

        let socket = retrier
            .run(
                || {
                    let endpoint = endpoint.clone();
                    async move {
                        endpoint
                            .bind_datagram()
                            .await
                            .map_err(|source| TransportError::Bind {
                                address: endpoint.to_string(),
                                source,
                            })
                    }
                },
                |attempt, error, delay| {
                    tracing::warn!(
                        address = %endpoint,
                        attempt,
                        error = %error,
                        retry_in_secs = delay.as_secs_f64(),
                        "bind failed, retrying"
                    );
                },
            )
            .await?;

        *self.local_addr.lock() = socket.local_addr();
        tracing::info!(address = %self.endpoint, "receiving datagrams");

        let decoder = Arc::clone(&self.decoder);
        let metrics = Arc::clone(&self.metrics);
        let endpoint = self.endpoint.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = socket.recv(&mut buf) => match received {
                        Ok(len) => {
                            metrics.connections_total.fetch_add(1, Ordering::Relaxed);
                            decode_datagram(&decoder, &metrics, &buf[..len]);
                        }
                        Err(e) => {
                            metrics.error();
                            tracing::warn!(address = %endpoint, error = %e, "receive error");
                        }
                    }
                }
            }
            tracing::info!(address = %endpoint, "stopped receiving");
        });

        Ok(())
    }
}

fn decode_datagram(decoder: &Arc<dyn FrameDecoder>, metrics: &BindMetrics, datagram: &[u8]) {
    for line in datagram.split(|b| *b == b'\n') {
        if line.is_empty() {
            continue;
        }
        let Ok(line) = std::str::from_utf8(line) else {
            metrics.error();
            tracing::error!(decoder = decoder.name(), "dropping non-utf8 line");
            continue;
        };
        if let Err(e) = decoder.decode_line(line) {
            metrics.error();
            tracing::error!(decoder = decoder.name(), error = %e, "dropping malformed line");
        }
    }
}

#[cfg(test)]
#[path = "bind_test.rs"]
mod bind_test;
