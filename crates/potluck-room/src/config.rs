//! Room configuration and the phase state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration for a room. Every value is fixed at creation time;
/// nothing is reconfigurable mid-room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Members per room. The game starts when exactly this many have
    /// completed admission.
    pub capacity: u32,

    /// Number of rounds before the room ends.
    pub rounds: u32,

    /// Per-round allocation ceiling. Whatever a member withholds from
    /// this amount goes into the tax pool.
    pub max_coins: i64,

    /// Length of the chat window each round.
    pub chat_window: Duration,

    /// Length of each member's private deposit window.
    pub turn_window: Duration,

    /// Grace interval between reaching quorum and the start broadcast.
    pub start_grace: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            rounds: 3,
            max_coins: 10,
            chat_window: Duration::from_secs(180),
            turn_window: Duration::from_secs(60),
            start_grace: Duration::from_secs(20),
        }
    }
}

impl RoomConfig {
    /// Clamps out-of-range values so the config is safe to run.
    ///
    /// Called by `Registry::create`. A capacity or round count of zero
    /// would leave the lifecycle with nothing to do, so both are raised
    /// to 1 with a warning rather than rejected.
    pub fn validated(mut self) -> Self {
        if self.capacity == 0 {
            tracing::warn!("room capacity of 0 requested, raising to 1");
            self.capacity = 1;
        }
        if self.rounds == 0 {
            tracing::warn!("round count of 0 requested, raising to 1");
            self.rounds = 1;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// The lifecycle phase of a room.
///
/// ```text
/// Forming ⇄ Starting → (Chat → Deposit → Settling)×rounds → Ended
/// ```
///
/// - **Forming**: waiting for `joined == capacity`. Unbounded.
/// - **Starting**: quorum reached; grace interval running. A member
///   lost to a failed start broadcast sends the room back to Forming.
/// - **Chat**: the free-form relay window is open.
/// - **Deposit**: members take turns in join order; one private
///   window each.
/// - **Settling**: the doubled tax pool is being divided and credited.
/// - **Ended**: terminal. No admissions, no message intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Forming,
    Starting,
    Chat,
    Deposit,
    Settling,
    Ended,
}

impl Phase {
    /// Returns `true` if the room is accepting new members.
    ///
    /// Starting counts as joinable because a lost member reopens a
    /// seat during reformation; the roster capacity check still gates
    /// the actual insert.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Forming | Self::Starting)
    }

    /// Returns `true` if the room has finished for good.
    pub fn is_over(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forming => write!(f, "Forming"),
            Self::Starting => write!(f, "Starting"),
            Self::Chat => write!(f, "Chat"),
            Self::Deposit => write!(f, "Deposit"),
            Self::Settling => write!(f, "Settling"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}
