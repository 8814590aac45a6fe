//! Protocol parse errors.

use thiserror::Error;

/// Failure to interpret a message on either side of the relay.
///
/// These are never fatal to a session: client protocol violations are
/// discarded with a warning, and malformed upstream payloads are skipped.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A setup message arrived without a system instruction.
    #[error("setup message is missing a system instruction")]
    MissingSystemInstruction,

    /// The message matched none of the known client shapes.
    #[error("unrecognized client message shape")]
    UnrecognizedShape,
}
