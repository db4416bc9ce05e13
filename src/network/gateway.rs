//! Broadcast Gateway
//!
//! Registry of live connections and their outbound queues. Sends never
//! block: a connection whose queue is closed or full is dropped on the spot
//! and reported back so the room can treat it as a departure.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::game::player::PlayerId;
use crate::network::protocol::ServerMessage;

/// Process-unique connection handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Gateway send failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// No such connection (already gone).
    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// No connection is bound to the player.
    #[error("No connection for player {0}")]
    UnknownPlayer(PlayerId),

    /// Writer side has shut down; the connection was dropped.
    #[error("Connection {0} closed")]
    Closed(ConnectionId),

    /// Outbound queue is full; the connection was dropped.
    #[error("Connection {0} is not keeping up")]
    Backlogged(ConnectionId),
}

/// One registered connection.
#[derive(Debug, Clone)]
struct ConnectionHandle {
    sender: mpsc::Sender<ServerMessage>,
    player: Option<PlayerId>,
}

/// Fan-out to every registered connection.
#[derive(Debug, Default)]
pub struct BroadcastGateway {
    next_id: AtomicU64,
    connections: Mutex<BTreeMap<ConnectionId, ConnectionHandle>>,
}

impl BroadcastGateway {
    /// Empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an outbound queue; the connection receives every broadcast
    /// from now on.
    pub fn register(&self, sender: mpsc::Sender<ServerMessage>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.lock().insert(id, ConnectionHandle { sender, player: None });
        debug!("Registered {}", id);
        id
    }

    /// Forget a connection. Returns the player it was bound to, if any.
    ///
    /// Dropping the handle closes the queue, which ends the writer task.
    pub fn unregister(&self, id: ConnectionId) -> Option<PlayerId> {
        self.lock().remove(&id).and_then(|h| h.player)
    }

    /// Associate a connection with its player.
    pub fn bind_player(&self, id: ConnectionId, player: PlayerId) -> Result<(), GatewayError> {
        match self.lock().get_mut(&id) {
            Some(handle) => {
                handle.player = Some(player);
                Ok(())
            }
            None => Err(GatewayError::UnknownConnection(id)),
        }
    }

    /// Detach a player from whatever connection carries it; the connection
    /// stays registered.
    pub fn unbind_player(&self, player: PlayerId) {
        for handle in self.lock().values_mut() {
            if handle.player == Some(player) {
                handle.player = None;
            }
        }
    }

    /// Player bound to a connection.
    pub fn player_of(&self, id: ConnectionId) -> Option<PlayerId> {
        self.lock().get(&id).and_then(|h| h.player)
    }

    /// Connection carrying a player.
    pub fn connection_of(&self, player: PlayerId) -> Option<ConnectionId> {
        self.lock()
            .iter()
            .find(|(_, h)| h.player == Some(player))
            .map(|(id, _)| *id)
    }

    /// Registered connections.
    pub fn connection_count(&self) -> usize {
        self.lock().len()
    }

    /// Send to every connection.
    ///
    /// Iterates a copy of the registry, so registrations racing with the
    /// broadcast neither skip nor duplicate anyone. Returns the players whose
    /// connections were dropped.
    pub fn broadcast(&self, message: &ServerMessage) -> Vec<PlayerId> {
        let targets: Vec<(ConnectionId, mpsc::Sender<ServerMessage>)> = self
            .lock()
            .iter()
            .map(|(id, h)| (*id, h.sender.clone()))
            .collect();

        let failed: Vec<ConnectionId> = targets
            .into_iter()
            .filter_map(|(id, sender)| Self::deliver(id, &sender, message.clone()).err().map(|_| id))
            .collect();

        failed
            .into_iter()
            .filter_map(|id| self.unregister(id))
            .collect()
    }

    /// Send to one connection. A failed connection is dropped.
    pub fn send_to(&self, id: ConnectionId, message: ServerMessage) -> Result<(), GatewayError> {
        let sender = self
            .lock()
            .get(&id)
            .map(|h| h.sender.clone())
            .ok_or(GatewayError::UnknownConnection(id))?;

        Self::deliver(id, &sender, message).map_err(|e| {
            self.unregister(id);
            e
        })
    }

    /// Send to the connection bound to `player`. A failed connection is dropped.
    pub fn send_to_player(&self, player: PlayerId, message: ServerMessage) -> Result<(), GatewayError> {
        let id = self.connection_of(player).ok_or(GatewayError::UnknownPlayer(player))?;
        self.send_to(id, message)
    }

    fn deliver(
        id: ConnectionId,
        sender: &mpsc::Sender<ServerMessage>,
        message: ServerMessage,
    ) -> Result<(), GatewayError> {
        match sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("Dropping {}: outbound queue full", id);
                Err(GatewayError::Backlogged(id))
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Dropping {}: writer closed", id);
                Err(GatewayError::Closed(id))
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ConnectionId, ConnectionHandle>> {
        self.connections.lock().unwrap_or_else(|e| e.into_inner())
    }
}
