//! TCP Game Server
//!
//! Accepts TCP connections and speaks the newline-delimited JSON protocol.
//! Each connection gets a reader loop (decode, dispatch to the room session)
//! and a writer task draining its outbound queue.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, broadcast, RwLock};
use tracing::{info, warn, error, debug, instrument};

use crate::core::rng::DeterministicRng;
use crate::game::settings::RoomSettings;
use crate::network::gateway::ConnectionId;
use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::network::session::RoomSession;
use crate::scoreboard::ScoreLedger;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outbound messages queued per connection before it counts as stalled.
    pub outbound_buffer: usize,
    /// Longest accepted inbound line in bytes.
    pub max_line_len: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5556)),
            max_connections: 256,
            outbound_buffer: 1024,
            max_line_len: 64 * 1024,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// The room and its connections.
    session: RoomSession,
    /// Connected clients and their gateway handles.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectionId>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server with its room.
    pub fn new(
        config: ServerConfig,
        settings: RoomSettings,
        rng: DeterministicRng,
        ledger: Arc<dyn ScoreLedger>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            session: RoomSession::new(settings, rng, ledger),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server v{} listening on {}", self.config.version, listener.local_addr()?);
        Ok(listener)
    }

    /// Bind and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let (connection, msg_rx) = match self.admit(addr).await {
                                Ok(admitted) => admitted,
                                Err(e) => {
                                    warn!("{}, rejecting {}", e, addr);
                                    continue;
                                }
                            };

                            info!("New connection from {} ({})", addr, connection);
                            self.handle_connection(stream, addr, connection, msg_rx);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Register a client before its task exists.
    ///
    /// Check and insert happen under one write lock, so the limit holds
    /// however fast connections arrive.
    async fn admit(
        &self,
        addr: SocketAddr,
    ) -> Result<(ConnectionId, mpsc::Receiver<ServerMessage>), GameServerError> {
        let mut clients = self.clients.write().await;
        if clients.len() >= self.config.max_connections {
            return Err(GameServerError::ConnectionLimitReached);
        }

        let (msg_tx, msg_rx) = mpsc::channel::<ServerMessage>(self.config.outbound_buffer);
        let connection = self.session.connect(msg_tx);
        clients.insert(addr, connection);
        Ok((connection, msg_rx))
    }

    /// Handle an admitted TCP connection.
    fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        connection: ConnectionId,
        mut msg_rx: mpsc::Receiver<ServerMessage>,
    ) {
        let clients = self.clients.clone();
        let session = self.session.clone();
        let max_line_len = self.config.max_line_len;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let (read_half, mut write_half) = stream.into_split();

            // Ends when the gateway drops the queue or the socket fails.
            let mut sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let mut line = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize {}: {}", msg.kind(), e);
                            continue;
                        }
                    };
                    line.push('\n');
                    if write_half.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                }
            });

            let mut lines = LineReader::new(read_half, max_line_len);

            // Handle incoming messages
            loop {
                tokio::select! {
                    frame = lines.next_frame() => {
                        match frame {
                            Ok(Some(Frame::Line(text))) => {
                                let text = text.trim();
                                if text.is_empty() {
                                    continue;
                                }
                                let client_msg = match ClientMessage::from_json(text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        continue;
                                    }
                                };
                                if !session.handle_message(connection, client_msg).await {
                                    debug!("Client {} said goodbye", addr);
                                    break;
                                }
                            }
                            Ok(Some(Frame::Oversize)) => {
                                warn!("Discarded oversize line from {}", addr);
                            }
                            Ok(Some(Frame::Invalid)) => {
                                debug!("Discarded non-UTF-8 line from {}", addr);
                            }
                            Ok(None) => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Err(e) => {
                                debug!("Read error for {}: {}", addr, e);
                                break;
                            }
                        }
                    }
                    _ = &mut sender_task => {
                        debug!("Writer for {} finished", addr);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();
            clients.write().await.remove(&addr);
            session.disconnect(connection).await;

            info!("Client {} cleaned up", addr);
        });
    }

    /// The room session.
    pub fn session(&self) -> &RoomSession {
        &self.session
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

// =============================================================================
// LINE FRAMING
// =============================================================================

/// One inbound frame.
#[derive(Debug, PartialEq)]
enum Frame {
    /// A complete line without its terminator.
    Line(String),
    /// A line longer than the limit; its bytes were skipped.
    Oversize,
    /// A line that is not valid UTF-8.
    Invalid,
}

/// Newline splitter with a per-line size cap.
///
/// All state lives in the struct, so dropping a pending `next_frame`
/// (e.g. inside `select!`) loses no input.
struct LineReader {
    inner: BufReader<OwnedReadHalf>,
    buf: Vec<u8>,
    max_len: usize,
    overflow: bool,
}

impl LineReader {
    fn new(read_half: OwnedReadHalf, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(read_half),
            buf: Vec::new(),
            max_len,
            overflow: false,
        }
    }

    /// Next frame, or `None` at end of stream.
    async fn next_frame(&mut self) -> std::io::Result<Option<Frame>> {
        loop {
            let available = self.inner.fill_buf().await?;

            if available.is_empty() {
                // EOF: a trailing unterminated line still counts.
                if self.overflow {
                    self.overflow = false;
                    return Ok(Some(Frame::Oversize));
                }
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            let (chunk_len, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i, true),
                None => (available.len(), false),
            };
            if !self.overflow {
                self.buf.extend_from_slice(&available[..chunk_len]);
                if self.buf.len() > self.max_len {
                    self.overflow = true;
                    self.buf.clear();
                }
            }
            self.inner.consume(if complete { chunk_len + 1 } else { chunk_len });

            if complete {
                if self.overflow {
                    self.overflow = false;
                    return Ok(Some(Frame::Oversize));
                }
                return Ok(Some(self.take_line()));
            }
        }
    }

    fn take_line(&mut self) -> Frame {
        match String::from_utf8(std::mem::take(&mut self.buf)) {
            Ok(text) => Frame::Line(text),
            Err(_) => Frame::Invalid,
        }
    }
}
