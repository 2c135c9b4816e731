//! Protocol error types

/// Errors from parsing or serializing telemetry records
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Inbound frame could not be parsed
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Record cannot be represented in the target format
    #[error("unsupported by format: {0}")]
    Unsupported(String),

    /// JSON serialization failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Create a malformed-frame error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}
