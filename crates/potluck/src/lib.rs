//! # Potluck
//!
//! A server for small, ephemeral game rooms: members join over a
//! WebSocket, chat during a timed window, then take turns privately
//! depositing coins, and each round the pooled tax is doubled and
//! split evenly among everyone.
//!
//! This crate is the glue: the accept loop, the per-connection
//! create/join/name flow, and startup configuration. The interesting
//! machinery (the registry and the room lifecycle) lives in
//! [`potluck_room`]; the wire schema in [`potluck_protocol`]; the
//! WebSocket plumbing in [`potluck_transport`].

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{PotluckServer, PotluckServerBuilder};

// Re-exported so embedders and tests don't need to depend on the
// sub-crates directly.
pub use potluck_protocol::{Action, Codec, JsonCodec, Message, SERVER_SENDER};
pub use potluck_room::{Phase, RoomConfig, RoomError};
