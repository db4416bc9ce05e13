//! Game Logic Module
//!
//! ## Module Structure
//!
//! - `settings`: World geometry, palette and timing rules
//! - `field`: Color grid and its generator
//! - `player`: Player ids, state and registry
//! - `room`: The room state machine
//! - `clock`: Timers driving the room

pub mod settings;
pub mod field;
pub mod player;
pub mod clock;
pub mod room;

// Re-export key types
pub use settings::RoomSettings;
pub use field::Field;
pub use player::{Player, PlayerId, PlayerRegistry, PlayerSnapshot};
pub use clock::{SharedRoom, TimerRequest};
pub use room::{Room, RoomPhase, RoundContext, JoinRejection};
