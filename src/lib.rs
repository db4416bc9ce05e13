//! # Colorfloor Game Server
//!
//! Authoritative server for a single-room "stand on the target color"
//! elimination game.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   COLORFLOOR SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  └── rng.rs      - Seedable Xorshift128+ PRNG                │
//! │                                                              │
//! │  game/           - Room logic                                │
//! │  ├── settings.rs - World geometry, palette, timing rules     │
//! │  ├── field.rs    - Color grid generation                     │
//! │  ├── player.rs   - Player ids and registry                   │
//! │  ├── room.rs     - Lobby/countdown/round state machine       │
//! │  └── clock.rs    - Tick and resolution timers                │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── protocol.rs - JSON line messages                        │
//! │  ├── gateway.rs  - Connection registry and broadcast         │
//! │  ├── session.rs  - Serialized access to the room             │
//! │  └── server.rs   - TCP server                                │
//! │                                                              │
//! │  scoreboard/     - Best score per player name                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Serialization
//!
//! Every room operation (join, move, leave, tick, resolution) runs under one
//! async mutex. Timers carry the generation they were started for, and a
//! timer from an older generation is ignored.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod scoreboard;

// Re-export commonly used types
pub use crate::core::rng::DeterministicRng;
pub use game::room::{Room, RoomPhase, JoinRejection};
pub use game::settings::RoomSettings;
pub use game::player::PlayerId;
pub use network::server::{GameServer, ServerConfig};
pub use network::session::RoomSession;
pub use scoreboard::{ScoreLedger, ScoreEntry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
