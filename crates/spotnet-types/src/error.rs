//! Error types for Spotnet message handling

use thiserror::Error;

/// Result type for message decoding and encoding
pub type Result<T> = std::result::Result<T, TypesError>;

/// Errors raised while turning bus payloads into typed messages and back
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// Payload is not valid UTF-8 JSON
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    /// Payload is JSON but not an object
    #[error("Payload is not a JSON object")]
    NotAnObject,

    /// No message variant matches the keys present
    #[error("Unrecognized message shape (keys: {keys})")]
    UnrecognizedShape { keys: String },

    /// A recognized variant carried a field that failed to decode
    #[error("Invalid {message} message: {reason}")]
    InvalidMessage { message: &'static str, reason: String },

    /// Outbound message could not be serialized
    #[error("Encoding failed: {0}")]
    Encode(String),
}
