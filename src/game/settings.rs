//! Room Settings
//!
//! Every tunable of the room lives here. Defaults reproduce the shipped game.

use std::time::Duration;

/// Default world width in world units.
pub const WORLD_WIDTH: f64 = 800.0;
/// Default world height in world units.
pub const WORLD_HEIGHT: f64 = 600.0;
/// Default cell edge length in world units.
pub const CELL_SIZE: f64 = 20.0;
/// Players can never stand closer than this to a world edge.
pub const EDGE_MARGIN: f64 = 10.0;

/// Default round palette, indexed by field color index.
pub const ROUND_COLORS: [&str; 6] = [
    "#FF0000", "#00FF00", "#0000FF", "#FFFF00", "#FF00FF", "#00FFFF",
];

/// Clock period.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);
/// Pause between a resolved round and the next one.
pub const RESOLUTION_DELAY: Duration = Duration::from_millis(2000);

/// Tunable parameters of a room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSettings {
    /// World width in world units.
    pub world_width: f64,
    /// World height in world units.
    pub world_height: f64,
    /// Cell edge length in world units.
    pub cell_size: f64,
    /// Distance from each edge a player is clamped to.
    pub edge_margin: f64,
    /// Round palette as hex strings; field cells index into it.
    pub palette: Vec<String>,
    /// Duration of round 1 (seconds).
    pub initial_round_time: f64,
    /// Lower bound on any round duration (seconds).
    pub min_round_time: f64,
    /// Duration lost per completed round (seconds). Zero keeps rounds constant.
    pub round_time_decrement: f64,
    /// Countdown when the second player joins (seconds).
    pub base_match_start_delay: f64,
    /// Countdown reduction per player above two (seconds).
    pub player_delay_reduction: f64,
    /// Lower bound on the match-start countdown (seconds).
    pub min_match_start_delay: f64,
    /// Longest accepted player name, in characters.
    pub max_name_len: usize,
    /// Entries included in GAME_OVER / PLAYER_ELIMINATED scoreboards.
    pub leaderboard_size: usize,
    /// Clock period.
    pub tick_interval: Duration,
    /// Pause between resolution and the next round.
    pub resolution_delay: Duration,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            world_width: WORLD_WIDTH,
            world_height: WORLD_HEIGHT,
            cell_size: CELL_SIZE,
            edge_margin: EDGE_MARGIN,
            palette: ROUND_COLORS.iter().map(|c| c.to_string()).collect(),
            initial_round_time: 10.0,
            min_round_time: 1.0,
            round_time_decrement: 0.0,
            base_match_start_delay: 10.0,
            player_delay_reduction: 2.0,
            min_match_start_delay: 2.0,
            max_name_len: 15,
            leaderboard_size: 10,
            tick_interval: TICK_INTERVAL,
            resolution_delay: RESOLUTION_DELAY,
        }
    }
}

impl RoomSettings {
    /// Grid width in cells.
    pub fn grid_width(&self) -> usize {
        (self.world_width / self.cell_size) as usize
    }

    /// Grid height in cells.
    pub fn grid_height(&self) -> usize {
        (self.world_height / self.cell_size) as usize
    }

    /// Seconds removed from the countdown per clock tick.
    pub fn tick_seconds(&self) -> f64 {
        self.tick_interval.as_secs_f64()
    }

    /// Duration of the given (1-based) round.
    pub fn round_duration(&self, round: u32) -> f64 {
        let elapsed = round.saturating_sub(1) as f64;
        (self.initial_round_time - elapsed * self.round_time_decrement).max(self.min_round_time)
    }

    /// Countdown for `players` players.
    ///
    /// `current` is the countdown already running, or `None` when the
    /// countdown is about to start from the base delay.
    pub fn match_start_delay(&self, players: usize, current: Option<f64>) -> f64 {
        let extra = players.saturating_sub(2) as f64;
        let from = current.unwrap_or(self.base_match_start_delay);
        (from - extra * self.player_delay_reduction).max(self.min_match_start_delay)
    }

    /// Clamp a requested position into the playable area.
    pub fn clamp_position(&self, x: f64, y: f64) -> (f64, f64) {
        (
            clamp_axis(x, self.edge_margin, self.world_width - self.edge_margin),
            clamp_axis(y, self.edge_margin, self.world_height - self.edge_margin),
        )
    }

    /// Spawn point for joining players.
    pub fn spawn_point(&self) -> (f64, f64) {
        (self.world_width / 2.0, self.world_height / 2.0)
    }

    /// Hex string of a palette index.
    pub fn color_name(&self, index: u8) -> Option<&str> {
        self.palette.get(index as usize).map(String::as_str)
    }
}

/// NaN lands on the lower bound.
fn clamp_axis(v: f64, lo: f64, hi: f64) -> f64 {
    if v.is_nan() {
        lo
    } else {
        v.max(lo).min(hi)
    }
}

// =============================================================================
// TESTS
// =============================================================================
