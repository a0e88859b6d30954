//! Unified error type for the server crate.

use potluck_protocol::ProtocolError;
use potluck_room::RoomError;
use potluck_transport::TransportError;

/// Top-level error wrapping the layer-specific ones, so the binary and
/// the connection handlers deal with a single type and `?` does the
/// conversions.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (not found, full, duplicate name).
    #[error(transparent)]
    Room(#[from] RoomError),
}
