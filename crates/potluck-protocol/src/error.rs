//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding, or validating
/// wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, or an
    /// unknown action tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but is not valid for the current exchange,
    /// e.g. a `deposit` while the room is still forming.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
