//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Serialization errors
    /// Failed to serialize data.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize data.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    // Command errors
    /// The request named a command the server does not implement.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// The request could not be parsed, or a required field was missing.
    ///
    /// The display text is the fixed message shown to clients; the reason
    /// is kept for logging.
    #[error("Invalid command format")]
    MalformedCommand {
        /// What was wrong with the request.
        reason: String,
    },

    // Content errors
    /// Encoded file content could not be decoded back to bytes.
    #[error("invalid {encoding} content: {reason}")]
    InvalidContent {
        /// Name of the content encoding.
        encoding: &'static str,
        /// Decoder error.
        reason: String,
    },

    // Frame errors
    /// Frame exceeds maximum allowed size.
    #[error("frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Frame has invalid magic bytes.
    #[error("invalid frame magic: expected {expected:#010x}, got {got:#010x}")]
    InvalidFrameMagic {
        /// Expected magic value.
        expected: u32,
        /// Actual magic value received.
        got: u32,
    },
}

impl ProtocolError {
    /// Build a malformed-command error from any displayable reason.
    pub fn malformed(reason: impl std::fmt::Display) -> Self {
        ProtocolError::MalformedCommand {
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}
