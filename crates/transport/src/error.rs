//! Transport error types

/// Errors from transport setup and socket handling
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind a listening socket
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error on an established socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol tag not present in the registry
    #[error("unknown protocol {tag:?}")]
    UnknownProtocol { tag: String },

    /// Protocol family cannot provide the requested capability
    #[error("protocol {tag:?} does not support {capability}")]
    Unsupported {
        tag: &'static str,
        capability: &'static str,
    },

    /// Endpoint construction failed (missing or mismatched fields)
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl TransportError {
    /// Create an invalid-endpoint error
    pub fn invalid_endpoint(msg: impl Into<String>) -> Self {
        Self::InvalidEndpoint(msg.into())
    }
}
