//! Error types for the room layer.

/// Errors returned by registry and roster operations.
///
/// All of these are scoped to one connection: the server relays them to
/// the originating client as an `error` message and the rest of the room
/// never notices.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room with this identifier is registered.
    #[error("room {0} doesn't exist")]
    NotFound(String),

    /// Every capacity slot is taken.
    #[error("room {0} is full")]
    Full(String),

    /// The name is already registered in this room.
    #[error("member {0} already exists")]
    MemberExists(String),

    /// The operation doesn't fit the room's current phase, like joining a
    /// room that is mid-game or already over, or a reserved name.
    #[error("{0}")]
    Protocol(String),
}
