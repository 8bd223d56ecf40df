//! Error types for price-stream.

use thiserror::Error;

/// Main error type for price-stream operations.
#[derive(Error, Debug)]
pub enum PriceStreamError {
    /// Session with the given ID was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionState,
        to: crate::session::SessionState,
    },

    /// The underlying connection is no longer open.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport-level failure while writing to a connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid runtime configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience Result type for price-stream operations.
pub type Result<T> = std::result::Result<T, PriceStreamError>;
