//! Room coordination for Potluck.
//!
//! A room is one game session: members join until the room is full,
//! chat during a timed window, then take turns privately depositing
//! coins; each round the pooled tax is doubled and split evenly. This
//! crate owns the parts with real invariants: the registry, the timed
//! phase machine, the roster, and fan-out. Everything network-shaped
//! stays behind the [`Link`] trait.
//!
//! # Key types
//!
//! - [`Registry`] creates, looks up, and removes rooms under concurrent access
//! - [`Room`] holds the roster, the inbound queue, and the lifecycle task
//! - [`Phase`] is the lifecycle state machine
//! - [`RoomConfig`] fixes capacity, rounds, windows, and the coin ceiling
//! - [`Link`] is the outbound seam a member's connection implements

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod link;
mod registry;
mod room;
mod roster;

pub use config::{Phase, RoomConfig};
pub use error::RoomError;
pub use link::{Link, LinkError};
pub use registry::Registry;
pub use room::{Room, RoomInfo};
