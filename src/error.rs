//! Error types for the admission mutator
//!
//! Request-path failures never surface here: they are folded into admission
//! responses by the webhook layer. This type covers startup and serving.

use thiserror::Error;

/// Main error type for admission mutator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or missing process configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to read a file from disk
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that could not be read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Sidecar configuration document did not parse
    #[error("invalid sidecar configuration: {0}")]
    SidecarConfig(#[from] serde_yaml::Error),

    /// TLS key pair could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTPS server failed while serving
    #[error("server error: {0}")]
    Server(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a TLS error with the given message
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Create a server error with the given message
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }
}
