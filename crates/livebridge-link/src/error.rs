//! Upstream link and authentication errors.

use thiserror::Error;

/// Token acquisition failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint could not be reached.
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The token endpoint answered with a non-success status.
    #[error("token endpoint returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The token response or the token itself was unusable.
    #[error("malformed token material: {0}")]
    Malformed(String),
}

/// Upstream connection failures.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No connection is currently open. Callers that can tolerate this
    /// (the relay's idle-retry path) treat it as "try again later".
    #[error("upstream link is not connected")]
    NotConnected,

    /// The upstream service closed the connection.
    #[error("upstream connection closed")]
    Closed,

    /// Bearer token acquisition failed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Transport-level WebSocket failure.
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    /// `connect()` gave up after its bounded retry budget.
    #[error("upstream connect gave up after {attempts} attempts")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
    },
}
