//! Codec trait and the JSON implementation.
//!
//! The rest of the system never serializes directly; it goes through a
//! [`Codec`] so the wire format can be swapped (e.g. for a binary codec)
//! without touching the room or server layers.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts between Rust types and raw bytes.
///
/// `Send + Sync + 'static` because codecs are stored in long-lived
/// connection handler tasks and shared across the Tokio thread pool.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value. The output owns its data;
    /// the input buffer can be dropped immediately after.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// JSON codec via `serde_json`.
///
/// Human-readable on the wire, which is what the browser client speaks
/// and what makes message logs greppable.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
