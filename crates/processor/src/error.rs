//! Processor error types

/// Errors from building processors
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// Bad or missing factory options
    #[error("processor config error: {0}")]
    Config(String),

    /// Name not present in the registry
    #[error("unknown processor {name:?}, available: [{available}]")]
    Unknown { name: String, available: String },
}

impl ProcessorError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
