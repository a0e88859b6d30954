//! Startup configuration, parsed once from the command line.
//!
//! Everything here is fixed per room at creation time; there is no
//! mid-room reconfiguration.

use std::time::Duration;

use clap::Parser;
use potluck_room::RoomConfig;

/// Command-line flags for the Potluck server.
#[derive(Debug, Clone, Parser)]
#[command(name = "potluck", about = "Chat-then-deposit game rooms over WebSockets")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub listen: String,

    /// Members per room; a room starts once exactly this many joined.
    #[arg(long, default_value_t = 3)]
    pub capacity: u32,

    /// Rounds per game.
    #[arg(long, default_value_t = 3)]
    pub rounds: u32,

    /// Coins each member may allocate per round.
    #[arg(long = "max-coins", default_value_t = 10)]
    pub max_coins: i64,

    /// Chat window length per round, in seconds.
    #[arg(long = "chat-secs", default_value_t = 180)]
    pub chat_secs: u64,

    /// Private deposit window length per turn, in seconds.
    #[arg(long = "turn-secs", default_value_t = 60)]
    pub turn_secs: u64,

    /// Grace interval between quorum and the start broadcast, in seconds.
    #[arg(long = "grace-secs", default_value_t = 20)]
    pub grace_secs: u64,
}

impl ServerConfig {
    /// The per-room configuration these flags describe.
    pub fn room_config(&self) -> RoomConfig {
        RoomConfig {
            capacity: self.capacity,
            rounds: self.rounds,
            max_coins: self.max_coins,
            chat_window: Duration::from_secs(self.chat_secs),
            turn_window: Duration::from_secs(self.turn_secs),
            start_grace: Duration::from_secs(self.grace_secs),
        }
        .validated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_standard_room() {
        let config = ServerConfig::parse_from(["potluck"]);
        assert_eq!(config.capacity, 3);
        assert_eq!(config.rounds, 3);
        assert_eq!(config.max_coins, 10);
        assert_eq!(config.chat_secs, 180);
        assert_eq!(config.turn_secs, 60);
        assert_eq!(config.grace_secs, 20);
    }

    #[test]
    fn room_config_converts_seconds() {
        let config = ServerConfig::parse_from([
            "potluck",
            "--capacity",
            "5",
            "--chat-secs",
            "30",
        ]);
        let room = config.room_config();
        assert_eq!(room.capacity, 5);
        assert_eq!(room.chat_window, Duration::from_secs(30));
        assert_eq!(room.turn_window, Duration::from_secs(60));
    }
}
