//! Room State Machine
//!
//! Single source of truth for match progress. Every operation runs to
//! completion under the caller's lock; the room never awaits and never
//! blocks on a connection.
//!
//! ```text
//!  WAITING ──2nd join──▶ COUNTDOWN ──countdown ≤ 0──▶ ROUND_ACTIVE ◀──────┐
//!     ▲                      │ (paused below 2 players)   │ timer ≤ 0    │ 2 s
//!     │                      └──empty──▶ WAITING          ▼              │
//!     └────── reset ◀── GAME_OVER ◀──survivors ≤ 1── ROUND_RESOLVING ────┘
//! ```
//!
//! Timers are requested, not owned: see [`crate::game::clock`]. Every phase
//! change that invalidates running timers bumps the generation, and ticks or
//! delays carrying an older generation are ignored.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::core::rng::DeterministicRng;
use crate::game::clock::{Generation, TimerRequest};
use crate::game::field::Field;
use crate::game::player::{Player, PlayerId, PlayerRegistry, PlayerSnapshot};
use crate::game::settings::RoomSettings;
use crate::network::gateway::{BroadcastGateway, ConnectionId, GatewayError};
use crate::network::protocol::{
    GameStateUpdate, JoinAccepted, MatchResult, RoundAnnouncement, ServerMessage,
    ELIMINATED_MARKER,
};
use crate::scoreboard::{ScoreEntry, ScoreLedger};

/// Tolerance for comparing accumulated 0.1 s steps against zero.
const TIME_EPSILON: f64 = 1e-9;

/// Minimum players for a countdown to run and a match to continue.
const MIN_PLAYERS: usize = 2;

/// Room state-machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Collecting players.
    Waiting,
    /// Match about to start.
    Countdown,
    /// Round timer running.
    RoundActive,
    /// Round over, outcome applied, next step pending.
    RoundResolving,
    /// Match finished; transient before reset.
    GameOver,
}

impl RoomPhase {
    /// New players may join.
    pub fn accepts_joins(&self) -> bool {
        matches!(self, RoomPhase::Waiting | RoomPhase::Countdown)
    }

    /// A match is running (players can be eliminated).
    pub fn in_match(&self) -> bool {
        matches!(self, RoomPhase::RoundActive | RoomPhase::RoundResolving)
    }
}

/// Why a join was refused. `Display` is the reason sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinRejection {
    /// A match is running.
    #[error("Cannot join: game already in progress")]
    MatchInProgress,

    /// Blank name.
    #[error("Player name must not be empty")]
    EmptyName,

    /// Name over the length limit.
    #[error("Player name must be at most {max} characters")]
    NameTooLong {
        /// Limit in characters.
        max: usize,
    },

    /// This connection already has a player.
    #[error("Already joined")]
    AlreadyJoined,

    /// The connection went away before the join completed.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Per-round values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RoundContext {
    /// Round number, 0 before the first round.
    pub round: u32,
    /// Palette index to stand on.
    pub target_color: Option<u8>,
    /// Seconds left.
    pub time_left: f64,
    /// Round length in seconds.
    pub duration: f64,
}

/// True if a player at `(x, y)` stands on `target`.
pub fn stands_on(field: &Field, cell_size: f64, x: f64, y: f64, target: u8) -> bool {
    field.color_at(x, y, cell_size) == Some(target)
}

/// The game room.
pub struct Room {
    settings: RoomSettings,
    rng: DeterministicRng,
    gateway: Arc<BroadcastGateway>,
    ledger: Arc<dyn ScoreLedger>,
    registry: PlayerRegistry,
    field: Field,
    phase: RoomPhase,
    round: RoundContext,
    countdown: f64,
    generation: Generation,
    timers: Vec<TimerRequest>,
    departures: VecDeque<PlayerId>,
}

impl Room {
    /// Create a room in WAITING with a fresh field.
    pub fn new(
        settings: RoomSettings,
        mut rng: DeterministicRng,
        gateway: Arc<BroadcastGateway>,
        ledger: Arc<dyn ScoreLedger>,
    ) -> Self {
        let field = Self::new_field(&settings, &mut rng);
        let countdown = settings.base_match_start_delay;
        let round = RoundContext {
            duration: settings.initial_round_time,
            ..Default::default()
        };

        Self {
            settings,
            rng,
            gateway,
            ledger,
            registry: PlayerRegistry::new(),
            field,
            phase: RoomPhase::Waiting,
            round,
            countdown,
            generation: 0,
            timers: Vec::new(),
            departures: VecDeque::new(),
        }
    }

    // =========================================================================
    // EXTERNAL EVENTS
    // =========================================================================

    /// A connection asks to join as `name`.
    ///
    /// On success the connection is bound to the new player, receives the
    /// CONNECT acknowledgement, and everyone receives a snapshot.
    pub fn on_player_join(
        &mut self,
        connection: ConnectionId,
        name: &str,
    ) -> Result<PlayerId, JoinRejection> {
        if !self.phase.accepts_joins() {
            return Err(JoinRejection::MatchInProgress);
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(JoinRejection::EmptyName);
        }
        if name.chars().count() > self.settings.max_name_len {
            return Err(JoinRejection::NameTooLong { max: self.settings.max_name_len });
        }
        if self.gateway.player_of(connection).is_some() {
            return Err(JoinRejection::AlreadyJoined);
        }

        let mut id = PlayerId::random(&mut self.rng);
        while self.registry.get(&id).is_some() {
            id = PlayerId::random(&mut self.rng);
        }
        if self.gateway.bind_player(connection, id).is_err() {
            return Err(JoinRejection::ConnectionClosed);
        }

        let (x, y) = self.settings.spawn_point();
        self.registry.insert(Player::new(id, name, x, y));
        info!("Player {} joined as {} ({} in room)", id, name, self.registry.len());

        let ack = ServerMessage::Connect(JoinAccepted { player_id: id, player_name: name.to_string() });
        if self.gateway.send_to(connection, ack).is_err() {
            self.departures.push_back(id);
        }

        if self.registry.len() >= MIN_PLAYERS {
            match self.phase {
                RoomPhase::Waiting => {
                    self.countdown = self.settings.match_start_delay(self.registry.len(), None);
                    self.phase = RoomPhase::Countdown;
                    info!("Match countdown started: {:.1}s", self.countdown);
                    self.start_ticker();
                }
                RoomPhase::Countdown => {
                    self.countdown =
                        self.settings.match_start_delay(self.registry.len(), Some(self.countdown));
                    debug!("Countdown adjusted to {:.1}s", self.countdown);
                }
                _ => {}
            }
        }

        self.broadcast_state();
        self.settle();
        Ok(id)
    }

    /// A player moves. Returns `false` if the move was ignored.
    pub fn on_player_move(&mut self, id: PlayerId, x: f64, y: f64) -> bool {
        let (x, y) = self.settings.clamp_position(x, y);
        match self.registry.get_mut(&id) {
            Some(player) if player.alive => {
                player.x = x;
                player.y = y;
            }
            _ => return false,
        }

        self.broadcast_state();
        self.settle();
        true
    }

    /// A player leaves. Returns `false` if the id was unknown.
    pub fn on_player_leave(&mut self, id: PlayerId) -> bool {
        let removed = self.remove_player(id);
        self.settle();
        removed
    }

    // =========================================================================
    // CLOCK EVENTS
    // =========================================================================

    /// One clock tick. Returns `false` when the ticker should stop.
    pub fn on_tick(&mut self, generation: Generation) -> bool {
        if generation != self.generation {
            return false;
        }

        let dt = self.settings.tick_seconds();
        let keep_going = match self.phase {
            RoomPhase::Countdown => {
                if self.registry.len() < MIN_PLAYERS {
                    // Paused until someone else joins.
                    self.broadcast_state();
                    true
                } else if self.countdown - dt <= TIME_EPSILON {
                    self.countdown = 0.0;
                    self.start_match();
                    false
                } else {
                    self.countdown -= dt;
                    self.broadcast_state();
                    true
                }
            }
            RoomPhase::RoundActive => {
                if self.round.time_left - dt <= TIME_EPSILON || self.registry.len() < MIN_PLAYERS {
                    self.round.time_left = 0.0;
                    self.resolve_round();
                    false
                } else {
                    self.round.time_left -= dt;
                    self.broadcast_state();
                    true
                }
            }
            _ => false,
        };

        self.settle();
        keep_going
    }

    /// The pause after a resolved round is over.
    pub fn on_resolution_elapsed(&mut self, generation: Generation) {
        if generation != self.generation || self.phase != RoomPhase::RoundResolving {
            return;
        }
        self.start_round(false);
        self.settle();
    }

    /// Timers requested since the last call, minus any already superseded.
    pub fn take_timer_requests(&mut self) -> Vec<TimerRequest> {
        let generation = self.generation;
        let mut requests = std::mem::take(&mut self.timers);
        requests.retain(|r| r.generation() == generation);
        requests
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Current phase.
    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    /// Current round number.
    pub fn round(&self) -> u32 {
        self.round.round
    }

    /// Current round values.
    pub fn round_context(&self) -> RoundContext {
        self.round
    }

    /// Seconds left in the round.
    pub fn time_left(&self) -> f64 {
        self.round.time_left
    }

    /// Seconds until the match starts.
    pub fn match_start_countdown(&self) -> f64 {
        self.countdown
    }

    /// Registered players.
    pub fn player_count(&self) -> usize {
        self.registry.len()
    }

    /// Alive players.
    pub fn alive_count(&self) -> usize {
        self.registry.alive_count()
    }

    /// Copy of one player.
    pub fn player(&self, id: &PlayerId) -> Option<PlayerSnapshot> {
        self.registry.get(id).map(Player::snapshot)
    }

    /// Current field.
    pub fn field(&self) -> &Field {
        &self.field
    }

    /// Current timer generation.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Room settings.
    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    /// GAME_STATE snapshot of the room.
    pub fn snapshot(&self) -> ServerMessage {
        let target_color = self
            .round
            .target_color
            .and_then(|c| self.settings.color_name(c))
            .map(str::to_string);

        ServerMessage::GameState(GameStateUpdate {
            round: self.round.round,
            target_color,
            time_left: self.round.time_left,
            duration: self.round.duration,
            game_started: !matches!(self.phase, RoomPhase::Waiting | RoomPhase::Countdown),
            is_round_active: self.phase == RoomPhase::RoundActive,
            match_start_countdown: self.countdown,
            field: self.field.cells().to_vec(),
            players: self.registry.snapshots(),
        })
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    fn start_match(&mut self) {
        info!("Match starting with {} players", self.registry.len());
        self.start_round(true);
    }

    fn start_round(&mut self, first: bool) {
        let palette = self.settings.palette.len().min(u8::MAX as usize + 1);
        let target = self.rng.next_int(palette as u32) as u8;

        self.round.round += 1;
        self.round.target_color = Some(target);
        self.round.duration = self.settings.round_duration(self.round.round);
        self.round.time_left = self.round.duration;
        self.field = Self::new_field(&self.settings, &mut self.rng);
        self.phase = RoomPhase::RoundActive;

        let target_color = self.settings.color_name(target).unwrap_or_default().to_string();
        info!(
            "Round {} started: target {} for {:.1}s",
            self.round.round, target_color, self.round.duration
        );

        let announcement = RoundAnnouncement {
            target_color,
            duration: self.round.duration,
            field: self.field.cells().to_vec(),
        };
        self.broadcast(if first {
            ServerMessage::MatchStart(announcement)
        } else {
            ServerMessage::RoundStart(announcement)
        });

        self.start_ticker();
    }

    fn resolve_round(&mut self) {
        self.phase = RoomPhase::RoundResolving;
        self.generation += 1;

        let Some(target) = self.round.target_color else {
            self.end_game(None);
            return;
        };

        let cell_size = self.settings.cell_size;
        let mut eliminated = Vec::new();
        for player in self.registry.iter_mut().filter(|p| p.alive) {
            if stands_on(&self.field, cell_size, player.x, player.y, target) {
                debug!("{} survived round {}", player.name, self.round.round);
            } else {
                player.alive = false;
                eliminated.push(player.id);
                info!(
                    "{} eliminated in round {} (on {:?}, needed {})",
                    player.name,
                    self.round.round,
                    self.field.color_at(player.x, player.y, cell_size),
                    target
                );
            }
        }

        self.broadcast_state();

        if !eliminated.is_empty() {
            let scores = self.leaderboard();
            for id in eliminated {
                let notice = ServerMessage::PlayerEliminated(MatchResult {
                    winner: Some(ELIMINATED_MARKER.to_string()),
                    scores: scores.clone(),
                });
                match self.gateway.send_to_player(id, notice) {
                    Ok(()) | Err(GatewayError::UnknownPlayer(_)) => {}
                    Err(_) => self.departures.push_back(id),
                }
            }
        }

        let survivors: Vec<PlayerId> = self.registry.iter().filter(|p| p.alive).map(|p| p.id).collect();
        match (survivors.first().copied(), survivors.get(1).copied()) {
            (Some(_), Some(_)) => {
                self.timers.push(TimerRequest::ResolutionDelay {
                    generation: self.generation,
                    delay: self.settings.resolution_delay,
                });
            }
            (winner, _) => self.end_game(winner),
        }
    }

    fn end_game(&mut self, winner: Option<PlayerId>) {
        self.phase = RoomPhase::GameOver;
        self.generation += 1;

        let winner_name = winner
            .and_then(|id| self.registry.get(&id))
            .map(|p| p.name.clone());
        match &winner_name {
            Some(name) => {
                info!("Game over after round {}: {} wins", self.round.round, name);
                self.record_score(name, self.round.round);
            }
            None => info!("Game over after round {}: no winner", self.round.round),
        }

        let scores = self.leaderboard();
        self.broadcast(ServerMessage::GameOver(MatchResult { winner: winner_name, scores }));
        self.reset();
    }

    fn reset(&mut self) {
        self.generation += 1;

        let credit = self.round.round.saturating_sub(1);
        for player in self.registry.drain() {
            self.record_score(&player.name, credit);
            self.gateway.unbind_player(player.id);
        }

        self.phase = RoomPhase::Waiting;
        self.round = RoundContext {
            duration: self.settings.initial_round_time,
            ..Default::default()
        };
        self.countdown = self.settings.base_match_start_delay;
        self.field = Self::new_field(&self.settings, &mut self.rng);
        info!("Room reset");

        self.broadcast_state();
    }

    /// Leave without settling; shared by explicit leaves and dropped
    /// connections.
    fn remove_player(&mut self, id: PlayerId) -> bool {
        let Some(player) = self.registry.remove(&id) else {
            return false;
        };
        self.gateway.unbind_player(id);
        info!("Player {} ({}) left ({} in room)", id, player.name, self.registry.len());

        self.record_score(&player.name, self.round.round.saturating_sub(1));

        if self.phase.in_match() && self.registry.len() < MIN_PLAYERS {
            self.end_game(None);
        } else if self.phase == RoomPhase::Countdown && self.registry.is_empty() {
            self.reset();
        } else {
            self.broadcast_state();
        }
        true
    }

    /// Process connections dropped during this operation's broadcasts.
    fn settle(&mut self) {
        while let Some(id) = self.departures.pop_front() {
            self.remove_player(id);
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn start_ticker(&mut self) {
        self.generation += 1;
        self.timers.push(TimerRequest::Ticker {
            generation: self.generation,
            period: self.settings.tick_interval,
        });
    }

    fn broadcast(&mut self, message: ServerMessage) {
        let dropped = self.gateway.broadcast(&message);
        self.departures.extend(dropped);
    }

    fn broadcast_state(&mut self) {
        let snapshot = self.snapshot();
        self.broadcast(snapshot);
    }

    fn leaderboard(&self) -> Vec<ScoreEntry> {
        self.ledger
            .top_n(self.settings.leaderboard_size)
            .unwrap_or_else(|e| {
                error!("Scoreboard read failed: {}", e);
                Vec::new()
            })
    }

    fn record_score(&self, name: &str, score: u32) {
        if let Err(e) = self.ledger.record_if_better(name, score) {
            error!("Scoreboard write for {} failed: {}", name, e);
        }
    }

    fn new_field(settings: &RoomSettings, rng: &mut DeterministicRng) -> Field {
        let colors = settings.palette.len().min(u8::MAX as usize) as u8;
        Field::generate(rng, settings.grid_width(), settings.grid_height(), colors)
    }
}

// =============================================================================
// TESTS
// =============================================================================
