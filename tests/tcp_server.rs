//! Talks to a real server over TCP.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use colorfloor::network::protocol::ServerMessage;
use colorfloor::scoreboard::MemoryLedger;
use colorfloor::{DeterministicRng, GameServer, RoomSettings, ServerConfig};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self { lines: BufReader::new(read_half).lines(), writer }
    }

    async fn send(&mut self, line: &str) {
        self.send_bytes(line.as_bytes()).await;
    }

    async fn send_bytes(&mut self, line: &[u8]) {
        self.writer.write_all(line).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    /// Next message, or `None` once the server closed the connection.
    async fn recv(&mut self) -> Option<ServerMessage> {
        let line = timeout(READ_TIMEOUT, self.lines.next_line()).await.unwrap().unwrap()?;
        Some(ServerMessage::from_json(&line).unwrap())
    }
}

async fn start_server() -> (Arc<GameServer>, std::net::SocketAddr) {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };
    let server = Arc::new(GameServer::new(
        config,
        RoomSettings::default(),
        DeterministicRng::new(99),
        Arc::new(MemoryLedger::new()),
    ));
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let running = server.clone();
    tokio::spawn(async move { running.serve(listener).await });
    (server, addr)
}

#[tokio::test]
async fn test_join_over_tcp() {
    let (server, addr) = start_server().await;
    let mut client = TestClient::connect(addr).await;

    // Garbage and unknown messages are skipped.
    client.send("not json").await;
    client.send(r#"{"type":"SHOUT"}"#).await;
    client.send(r#"{"type":"CONNECT","playerName":"alice"}"#).await;

    let Some(ServerMessage::Connect(ack)) = client.recv().await else {
        panic!("expected CONNECT ack");
    };
    assert_eq!(ack.player_name, "alice");

    let Some(ServerMessage::GameState(state)) = client.recv().await else {
        panic!("expected GAME_STATE");
    };
    assert_eq!(state.players.len(), 1);
    assert_eq!(state.players[0].id, ack.player_id);
    assert!(!state.game_started);

    client.send(r#"{"type":"MOVE","x":-5,"y":5000}"#).await;
    let Some(ServerMessage::GameState(state)) = client.recv().await else {
        panic!("expected GAME_STATE after move");
    };
    assert_eq!((state.players[0].x, state.players[0].y), (10.0, 590.0));

    server.shutdown();
}

#[tokio::test]
async fn test_rejected_join_and_disconnect_over_tcp() {
    let (server, addr) = start_server().await;
    let mut client = TestClient::connect(addr).await;

    client.send(r#"{"type":"CONNECT","playerName":""}"#).await;
    assert!(matches!(client.recv().await, Some(ServerMessage::JoinRejected(_))));

    client.send(r#"{"type":"CONNECT","playerName":"bob"}"#).await;
    assert!(matches!(client.recv().await, Some(ServerMessage::Connect(_))));

    client.send(r#"{"type":"DISCONNECT"}"#).await;
    // Drain until the server hangs up.
    while client.recv().await.is_some() {}

    let mut waited = Duration::ZERO;
    while server.connection_count().await > 0 && waited < READ_TIMEOUT {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert_eq!(server.connection_count().await, 0);
    assert_eq!(server.session().with_room(|room| room.player_count()).await, 0);

    server.shutdown();
}

#[tokio::test]
async fn test_non_utf8_join_is_ignored() {
    let (server, addr) = start_server().await;
    let mut client = TestClient::connect(addr).await;

    client.send_bytes(b"{\"type\":\"CONNECT\",\"playerName\":\"a\xff\xfe\"}").await;
    client.send(r#"{"type":"CONNECT","playerName":"bob"}"#).await;

    // The first reply belongs to the second, valid request.
    let Some(ServerMessage::Connect(ack)) = client.recv().await else {
        panic!("expected CONNECT ack");
    };
    assert_eq!(ack.player_name, "bob");
    assert_eq!(server.session().with_room(|room| room.player_count()).await, 1);

    server.shutdown();
}
