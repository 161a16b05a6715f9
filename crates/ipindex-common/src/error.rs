//! Error types for ipindex

use thiserror::Error;

/// Result type alias for ipindex operations
pub type Result<T> = std::result::Result<T, IpIndexError>;

/// Main error type for ipindex
#[derive(Error, Debug)]
pub enum IpIndexError {
    #[error("Unknown registry: {0}")]
    UnknownRegistry(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IpIndexError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
