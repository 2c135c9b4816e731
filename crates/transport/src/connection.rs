//! Connection contract - inbound framing adapters
//!
//! A [`Connection`] owns one accepted peer stream and turns its bytes into
//! records on the input channel. The transport ships a line-framed
//! implementation; the wire syntax of each line belongs to the plugin's
//! [`FrameDecoder`].
//!
//! Malformed frames are logged and dropped; they never close the peer.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use ffwd_protocol::ProtocolError;

use crate::{IoStream, TransportError};

/// Longest accepted line, matching the read buffer granularity.
pub const DEFAULT_MAX_LINE_BYTES: usize = 8192;

/// Parses one inbound frame; implementations publish the result onto the
/// input channel they were constructed with.
pub trait FrameDecoder: Send + Sync {
    /// Decoder name for log context
    fn name(&self) -> &'static str;

    /// Decode a single line/frame (without its trailing newline)
    fn decode_line(&self, line: &str) -> Result<(), ProtocolError>;
}

/// One accepted peer's framing loop.
#[async_trait]
pub trait Connection: Send {
    /// Run until the peer disconnects or the stream errors
    async fn run(self: Box<Self>, stream: Box<dyn IoStream>, peer: String)
        -> Result<(), TransportError>;
}

/// Builds one [`Connection`] per accepted peer.
pub trait ConnectionFactory: Send + Sync {
    /// Create a connection for a freshly accepted peer
    fn connection(&self) -> Box<dyn Connection>;
}

/// Newline-framed connection delegating each line to a [`FrameDecoder`].
pub struct LineConnection {
    decoder: Arc<dyn FrameDecoder>,
    max_line_bytes: usize,
}

impl LineConnection {
    /// Create a line connection with the default line length bound
    pub fn new(decoder: Arc<dyn FrameDecoder>) -> Self {
        Self {
            decoder,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

#[async_trait]
impl Connection for LineConnection {
    async fn run(
        self: Box<Self>,
        stream: Box<dyn IoStream>,
        peer: String,
    ) -> Result<(), TransportError> {
        let mut lines = BufReader::new(stream).lines();

        while let Some(line) = lines.next_line().await? {
            if line.len() > self.max_line_bytes {
                tracing::error!(
                    peer = %peer,
                    decoder = self.decoder.name(),
                    length = line.len(),
                    "dropping oversized line"
                );
                continue;
            }
            if let Err(e) = self.decoder.decode_line(&line) {
                tracing::error!(
                    peer = %peer,
                    decoder = self.decoder.name(),
                    error = %e,
                    "dropping malformed line"
                );
            }
        }

        Ok(())
    }
}

/// Factory producing [`LineConnection`]s sharing one decoder.
pub struct LineConnectionFactory {
    decoder: Arc<dyn FrameDecoder>,
}

impl LineConnectionFactory {
    /// Create a factory around a decoder
    pub fn new(decoder: Arc<dyn FrameDecoder>) -> Self {
        Self { decoder }
    }
}

impl ConnectionFactory for LineConnectionFactory {
    fn connection(&self) -> Box<dyn Connection> {
        Box::new(LineConnection::new(Arc::clone(&self.decoder)))
    }
}
