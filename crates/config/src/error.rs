//! Configuration error types

/// Errors from loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Could not read the config file
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or shape error
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Semantically invalid configuration
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create a validation error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
