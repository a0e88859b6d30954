//! The wire schema exchanged between connections and rooms.
//!
//! Every logical exchange is one [`Message`]: a flat JSON object carrying
//! an action tag, the sender's name, an optional recipient list, and a
//! free-form `contents` string whose meaning depends on the action.
//! Keeping the schema flat (no envelope/payload nesting) matches what the
//! browser client expects and keeps DevTools inspection trivial.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sender name used for every message originated by the server itself.
///
/// Member names are checked against this at admission so no member can
/// impersonate the server.
pub const SERVER_SENDER: &str = "server";

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// The action vocabulary.
///
/// Serialized as camelCase strings (`"turnStart"`, `"gameEnd"`, ...),
/// the exact tags the client speaks.
///
/// | action | direction | contents |
/// |---|---|---|
/// | `create` | client → server | ignored; reply carries the new room id |
/// | `join` | client → server | target room id; reply echoes the id |
/// | `name` | client → server | desired member name; reply confirms admission |
/// | `chat` | both | free text, relayed during the chat window only |
/// | `start` | server → client | the game is beginning |
/// | `turnStart` / `turnEnd` | server → client | whose private window opened/closed |
/// | `deposit` | client → server | stringified integer coin amount |
/// | `roundEnd` | server → client | settlement summary (pool and per-member share) |
/// | `leave` | client → server | explicit exit from the room |
/// | `gameEnd` | server → client | final notice; the server closes the connection after |
/// | `error` | server → client | human-readable reason, `error` field set |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Error,
    Create,
    Join,
    Name,
    Chat,
    Start,
    TurnStart,
    Deposit,
    TurnEnd,
    RoundEnd,
    Leave,
    GameEnd,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Error => "error",
            Self::Create => "create",
            Self::Join => "join",
            Self::Name => "name",
            Self::Chat => "chat",
            Self::Start => "start",
            Self::TurnStart => "turnStart",
            Self::Deposit => "deposit",
            Self::TurnEnd => "turnEnd",
            Self::RoundEnd => "roundEnd",
            Self::Leave => "leave",
            Self::GameEnd => "gameEnd",
        };
        write!(f, "{tag}")
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One logical exchange on the wire.
///
/// `timestamp` is a per-room sequence number assigned by the room's
/// lifecycle task at send time. Values supplied by clients are
/// overwritten before fan-out, so ordering can always be trusted
/// server-side.
///
/// An empty `recipients` list on a broadcast-style action means
/// "everyone except the sender".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub action: Action,

    #[serde(default)]
    pub sender: String,

    #[serde(default)]
    pub recipients: Vec<String>,

    #[serde(default)]
    pub contents: String,

    #[serde(default)]
    pub timestamp: u64,

    /// Populated only on `error` actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    /// A server-originated message with the given action and contents.
    pub fn server(action: Action, contents: impl Into<String>) -> Self {
        Self {
            action,
            sender: SERVER_SENDER.to_string(),
            recipients: Vec::new(),
            contents: contents.into(),
            timestamp: 0,
            error: None,
        }
    }

    /// An `error` reply. The reason lands in both `contents` and the
    /// `error` field so thin clients can display either.
    pub fn error(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            action: Action::Error,
            sender: SERVER_SENDER.to_string(),
            recipients: Vec::new(),
            contents: reason.clone(),
            timestamp: 0,
            error: Some(reason),
        }
    }

    /// A chat message from a member, addressed to `recipients`
    /// (empty = everyone else in the room).
    pub fn chat(
        sender: impl Into<String>,
        recipients: Vec<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            action: Action::Chat,
            sender: sender.into(),
            recipients,
            contents: text.into(),
            timestamp: 0,
            error: None,
        }
    }
}
