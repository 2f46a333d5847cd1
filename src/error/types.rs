//! Error types
//!
//! Request-level errors surfaced to API clients and process-level errors
//! that abort startup or serving.

use axum::http::Method;
use std::io;
use thiserror::Error;

/// Errors produced while handling a single request
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("the requested resource could not be found")]
    NotFound,

    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(Method),

    #[error("could not determine client address: {0}")]
    ClientAddress(String),

    #[error("handler panicked: {0}")]
    Panic(String),
}

impl ApiError {
    /// Whether this error is the server's fault rather than the client's
    pub fn is_server_error(&self) -> bool {
        matches!(self, ApiError::ClientAddress(_) | ApiError::Panic(_))
    }
}

/// Errors that stop the server process
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid trusted proxy '{0}'")]
    TrustedProxy(String),

    #[error("server error: {0}")]
    Serve(#[from] io::Error),
}
