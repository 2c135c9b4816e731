//! FFWD transport - socket ownership for both directions
//!
//! Outbound, the [`ConnectClient`] owns one peer's socket: admission into a
//! bounded outbound queue, streaming or buffered flushing, drop accounting,
//! and the reconnect state machine with exponential backoff.
//!
//! Inbound, the [`BindServer`] accepts stream connections and runs one
//! [`Connection`] per peer; the [`DatagramServer`] covers the udp families.
//! Binding is wrapped by the [`Retrier`].
//!
//! The [`ProtocolRegistry`] resolves protocol tags ("tcp", "udp",
//! "unix+tcp", "unix+udp") to their families and capabilities.

mod bind;
mod connect;
mod connection;
mod error;
mod peer;
mod retry;

pub use bind::{BindMetrics, BindMetricsSnapshot, BindServer, DatagramServer};
pub use connect::{
    ConnectClient, ConnectConfig, ConnectCounters, ConnectCountersSnapshot, ReconnectPolicy,
};
pub use connection::{
    Connection, ConnectionFactory, FrameDecoder, LineConnection, LineConnectionFactory,
    DEFAULT_MAX_LINE_BYTES,
};
pub use error::TransportError;
pub use peer::{
    Address, BindEndpoint, DatagramSocket, Peer, ProtocolFamily, ProtocolRegistry, StreamListener,
};
pub use retry::{RetryConfig, Retrier};

use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream, independent of the concrete socket family.
pub trait IoStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> IoStream for T {}
