//! Wire protocol for Potluck.
//!
//! This crate defines the language clients and the server speak:
//!
//! - **[`Message`] / [`Action`]**: the flat JSON exchange format and
//!   its action vocabulary.
//! - **[`Codec`] / [`JsonCodec`]**: how messages become bytes.
//! - **[`ProtocolError`]**: what can go wrong in between.
//!
//! The protocol layer knows nothing about connections or rooms; it only
//! shapes and parses messages. Transport moves the bytes, the room crate
//! gives them meaning.

mod codec;
mod error;
mod message;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{Action, Message, SERVER_SENDER};
