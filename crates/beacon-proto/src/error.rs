//! Error types for the beacon-proto crate.

use thiserror::Error;

/// Errors that can occur during protocol operations.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a frame.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a frame.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// A response carried a different event than the call expected.
    #[error("unexpected response event: expected {expected}, got {got}")]
    UnexpectedEvent {
        /// The event the caller asked for.
        expected: &'static str,
        /// The event the beacon answered with.
        got: &'static str,
    },

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(String),
}
