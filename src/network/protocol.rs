//! Protocol Messages
//!
//! Wire format for client-server communication over TCP.
//! One JSON object per line; the `type` field selects the message kind and
//! the remaining camelCase fields carry its payload.

use serde::{Serialize, Deserialize};

use crate::game::player::{PlayerId, PlayerSnapshot};
use crate::scoreboard::ScoreEntry;

/// Marker carried in the `winner` field of PLAYER_ELIMINATED.
pub const ELIMINATED_MARKER: &str = "you lost";

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Ask to join the room.
    Connect(JoinRequest),

    /// Leave the room.
    Disconnect(LeaveRequest),

    /// Move own player.
    Move(MoveRequest),
}

/// Join request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Requested display name. Missing or null reads as empty.
    #[serde(default)]
    pub player_name: Option<String>,
}

/// Leave request.
///
/// The id is informational; the server always removes the player bound to
/// the sending connection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    /// Player id as the client knows it.
    #[serde(default)]
    pub player_id: Option<String>,
}

/// Position update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Requested world X.
    pub x: f64,
    /// Requested world Y.
    pub y: f64,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Join accepted.
    Connect(JoinAccepted),

    /// Join refused.
    JoinRejected(JoinRefused),

    /// Full room snapshot.
    GameState(GameStateUpdate),

    /// First round of a match began.
    MatchStart(RoundAnnouncement),

    /// A later round began.
    RoundStart(RoundAnnouncement),

    /// Match finished.
    GameOver(MatchResult),

    /// Personal notice to a player who missed the target.
    PlayerEliminated(MatchResult),
}

/// Join acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAccepted {
    /// Assigned id.
    pub player_id: PlayerId,
    /// Accepted name.
    pub player_name: String,
}

/// Join refusal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRefused {
    /// Human-readable reason.
    pub reason: String,
}

/// Room snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateUpdate {
    /// Current round (0 before the first round).
    pub round: u32,
    /// Target color hex string, once a round has started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_color: Option<String>,
    /// Seconds left in the round.
    pub time_left: f64,
    /// Round length in seconds.
    pub duration: f64,
    /// A match is running.
    pub game_started: bool,
    /// A round timer is running.
    pub is_round_active: bool,
    /// Seconds until the match starts.
    pub match_start_countdown: f64,
    /// Flattened grid of color indices.
    pub field: Vec<u8>,
    /// Player copies.
    pub players: Vec<PlayerSnapshot>,
}

/// Round start payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundAnnouncement {
    /// Target color hex string.
    pub target_color: String,
    /// Round length in seconds.
    pub duration: f64,
    /// Flattened grid of color indices.
    pub field: Vec<u8>,
}

/// GAME_OVER / PLAYER_ELIMINATED payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Winner name, or the elimination marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    /// Top scores, best first.
    pub scores: Vec<ScoreEntry>,
}

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Wire name of the message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connect(_) => "CONNECT",
            ServerMessage::JoinRejected(_) => "JOIN_REJECTED",
            ServerMessage::GameState(_) => "GAME_STATE",
            ServerMessage::MatchStart(_) => "MATCH_START",
            ServerMessage::RoundStart(_) => "ROUND_START",
            ServerMessage::GameOver(_) => "GAME_OVER",
            ServerMessage::PlayerEliminated(_) => "PLAYER_ELIMINATED",
        }
    }
}
