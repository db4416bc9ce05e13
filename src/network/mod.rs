//! Network Layer
//!
//! TCP server speaking newline-delimited JSON. Game rules live in `game/`;
//! this layer only frames, routes and fans out messages.

pub mod protocol;
pub mod gateway;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, GameStateUpdate, RoundAnnouncement, MatchResult};
pub use gateway::{BroadcastGateway, ConnectionId, GatewayError};
pub use session::RoomSession;
pub use server::{GameServer, ServerConfig, GameServerError};
