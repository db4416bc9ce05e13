//! Room Session
//!
//! Async face of the room. Connections and the clock all go through one
//! `tokio::sync::Mutex<Room>`, so every join, move, leave and tick runs
//! alone; timers the room asks for are started once the lock is released.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::rng::DeterministicRng;
use crate::game::clock::{self, SharedRoom};
use crate::game::player::PlayerId;
use crate::game::room::{JoinRejection, Room};
use crate::game::settings::RoomSettings;
use crate::network::gateway::{BroadcastGateway, ConnectionId};
use crate::network::protocol::{ClientMessage, JoinRefused, ServerMessage};
use crate::scoreboard::ScoreLedger;

/// The single room of this process, plus its connections.
#[derive(Clone)]
pub struct RoomSession {
    room: SharedRoom,
    gateway: Arc<BroadcastGateway>,
}

impl RoomSession {
    /// Create a session around a fresh room.
    pub fn new(settings: RoomSettings, rng: DeterministicRng, ledger: Arc<dyn ScoreLedger>) -> Self {
        let gateway = Arc::new(BroadcastGateway::new());
        let room = Room::new(settings, rng, gateway.clone(), ledger);

        Self {
            room: Arc::new(tokio::sync::Mutex::new(room)),
            gateway,
        }
    }

    /// Shared room handle (for inspection).
    pub fn room(&self) -> &SharedRoom {
        &self.room
    }

    /// Connection registry.
    pub fn gateway(&self) -> &Arc<BroadcastGateway> {
        &self.gateway
    }

    /// Register a new connection's outbound queue.
    pub fn connect(&self, sender: mpsc::Sender<ServerMessage>) -> ConnectionId {
        self.gateway.register(sender)
    }

    /// Join the room from `connection`.
    ///
    /// A refusal is also sent to the connection as JOIN_REJECTED.
    pub async fn join(&self, connection: ConnectionId, name: &str) -> Result<PlayerId, JoinRejection> {
        let result = self.with_room(|room| room.on_player_join(connection, name)).await;

        if let Err(rejection) = &result {
            info!("Join from {} as {:?} rejected: {}", connection, name, rejection);
            let refusal = ServerMessage::JoinRejected(JoinRefused { reason: rejection.to_string() });
            // A dead connection cleans itself up through its reader.
            let _ = self.gateway.send_to(connection, refusal);
        }
        result
    }

    /// Move the player bound to `connection`.
    pub async fn move_player(&self, connection: ConnectionId, x: f64, y: f64) -> bool {
        let Some(player) = self.gateway.player_of(connection) else {
            return false;
        };
        self.with_room(|room| room.on_player_move(player, x, y)).await
    }

    /// Connection is gone: drop it from the gateway and its player from the room.
    pub async fn disconnect(&self, connection: ConnectionId) {
        if let Some(player) = self.gateway.unregister(connection) {
            self.with_room(|room| room.on_player_leave(player)).await;
        }
        debug!("{} disconnected", connection);
    }

    /// Dispatch one decoded message. Returns `false` when the connection
    /// asked to close.
    pub async fn handle_message(&self, connection: ConnectionId, message: ClientMessage) -> bool {
        match message {
            ClientMessage::Connect(request) => {
                let name = request.player_name.unwrap_or_default();
                let _ = self.join(connection, &name).await;
                true
            }
            ClientMessage::Move(request) => {
                self.move_player(connection, request.x, request.y).await;
                true
            }
            ClientMessage::Disconnect(_) => false,
        }
    }

    /// Run `f` under the room lock, then start any timers it requested.
    pub async fn with_room<R>(&self, f: impl FnOnce(&mut Room) -> R) -> R {
        let (result, timers) = {
            let mut room = self.room.lock().await;
            let result = f(&mut room);
            (result, room.take_timer_requests())
        };
        clock::schedule(&self.room, timers);
        result
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::game::room::RoomPhase;
    use crate::network::protocol::{JoinRequest, LeaveRequest, MoveRequest};
    use crate::scoreboard::MemoryLedger;

    fn session() -> RoomSession {
        RoomSession::new(
            RoomSettings::default(),
            DeterministicRng::new(77),
            Arc::new(MemoryLedger::new()),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_join_rejection_is_sent() {
        let session = session();
        let (tx, mut rx) = mpsc::channel(64);
        let conn = session.connect(tx);

        let keep_open = session
            .handle_message(conn, ClientMessage::Connect(JoinRequest { player_name: None }))
            .await;

        assert!(keep_open);
        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::JoinRejected(JoinRefused {
                reason: JoinRejection::EmptyName.to_string(),
            })]
        );
    }

    #[tokio::test]
    async fn test_move_before_join_ignored() {
        let session = session();
        let (tx, mut rx) = mpsc::channel(64);
        let conn = session.connect(tx);

        session.handle_message(conn, ClientMessage::Move(MoveRequest { x: 1.0, y: 1.0 })).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_message_closes() {
        let session = session();
        let (tx, _rx) = mpsc::channel(64);
        let conn = session.connect(tx);
        session.join(conn, "alice").await.unwrap();

        let keep_open = session
            .handle_message(conn, ClientMessage::Disconnect(LeaveRequest::default()))
            .await;
        assert!(!keep_open);

        session.disconnect(conn).await;
        assert_eq!(session.with_room(|room| room.player_count()).await, 0);
        assert_eq!(session.gateway().connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_drives_countdown() {
        let session = session();
        let (tx_a, _rx_a) = mpsc::channel(4096);
        let (tx_b, _rx_b) = mpsc::channel(4096);
        let a = session.connect(tx_a);
        let b = session.connect(tx_b);
        session.join(a, "a").await.unwrap();
        session.join(b, "b").await.unwrap();

        tokio::time::sleep(Duration::from_millis(1050)).await;
        let countdown = session.with_room(|room| room.match_start_countdown()).await;
        assert!((countdown - 9.0).abs() < 1e-6, "countdown was {}", countdown);

        tokio::time::sleep(Duration::from_secs(9)).await;
        let (phase, round) = session.with_room(|room| (room.phase(), room.round())).await;
        assert_eq!(phase, RoomPhase::RoundActive);
        assert_eq!(round, 1);
    }
}
