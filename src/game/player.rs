//! Player Registry
//!
//! Connected players with their live position and alive flag. Owned by the
//! room; everything handed outward is a [`PlayerSnapshot`] copy.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;

/// Unique player identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Draw a random (version 4 layout) id from the room's RNG.
    pub fn random(rng: &mut DeterministicRng) -> Self {
        let uuid = uuid::Builder::from_random_bytes(rng.next_bytes16()).into_uuid();
        Self(*uuid.as_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_bytes(self.0))
    }
}

impl Serialize for PlayerId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_uuid_string())
    }
}

impl<'de> Deserialize<'de> for PlayerId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_uuid_str(&s).ok_or_else(|| serde::de::Error::custom("invalid player id"))
    }
}

/// Live player state.
#[derive(Clone, Debug, PartialEq)]
pub struct Player {
    /// Identifier.
    pub id: PlayerId,
    /// Display name (also the scoreboard key).
    pub name: String,
    /// World X.
    pub x: f64,
    /// World Y.
    pub y: f64,
    /// Still in the match.
    pub alive: bool,
}

impl Player {
    /// Create an alive player at the given position.
    pub fn new(id: PlayerId, name: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id,
            name: name.into(),
            x,
            y,
            alive: true,
        }
    }

    /// Copy for the wire.
    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            alive: self.alive,
        }
    }
}

/// Point-in-time copy of a player, as sent in GAME_STATE.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Identifier.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// World X.
    pub x: f64,
    /// World Y.
    pub y: f64,
    /// Still in the match.
    pub alive: bool,
}

/// Players currently in the room.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<PlayerId, Player>,
}

impl PlayerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a player, replacing any previous entry with the same id.
    pub fn insert(&mut self, player: Player) {
        self.players.insert(player.id, player);
    }

    /// Remove a player.
    pub fn remove(&mut self, id: &PlayerId) -> Option<Player> {
        self.players.remove(id)
    }

    /// Look up a player.
    pub fn get(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Look up a player mutably.
    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    /// Number of players (alive or not).
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// True if no players are registered.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Number of alive players.
    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.alive).count()
    }

    /// Iterate players in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Iterate players mutably in id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    /// Remove and return every player.
    pub fn drain(&mut self) -> Vec<Player> {
        std::mem::take(&mut self.players).into_values().collect()
    }

    /// Copies of every player, in id order.
    pub fn snapshots(&self) -> Vec<PlayerSnapshot> {
        self.players.values().map(Player::snapshot).collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
