//! End-to-end room scenarios driven by the real clock tasks, with tokio
//! time paused so whole matches run instantly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use colorfloor::game::room::RoomPhase;
use colorfloor::network::gateway::ConnectionId;
use colorfloor::network::protocol::{
    ClientMessage, JoinRequest, LeaveRequest, MoveRequest, ServerMessage, ELIMINATED_MARKER,
};
use colorfloor::scoreboard::MemoryLedger;
use colorfloor::{DeterministicRng, PlayerId, RoomSession, RoomSettings};

struct Client {
    connection: ConnectionId,
    inbox: mpsc::Receiver<ServerMessage>,
}

impl Client {
    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            out.push(msg);
        }
        out
    }
}

fn session(seed: u64) -> RoomSession {
    RoomSession::new(
        RoomSettings::default(),
        DeterministicRng::new(seed),
        Arc::new(MemoryLedger::new()),
    )
}

fn connect(session: &RoomSession) -> Client {
    let (tx, inbox) = mpsc::channel(8192);
    Client { connection: session.connect(tx), inbox }
}

async fn join(session: &RoomSession, name: &str) -> (PlayerId, Client) {
    let client = connect(session);
    let id = session.join(client.connection, name).await.unwrap();
    (id, client)
}

/// Center of the first cell that is (or is not) the round's target color.
async fn cell_where(session: &RoomSession, on_target: bool) -> (f64, f64) {
    session
        .with_room(|room| {
            let target = room.round_context().target_color.unwrap();
            let field = room.field();
            let cell = room.settings().cell_size;
            for gy in 0..field.height() {
                for gx in 0..field.width() {
                    if (field.get(gx, gy) == Some(target)) == on_target {
                        return (gx as f64 * cell + cell / 2.0, gy as f64 * cell + cell / 2.0);
                    }
                }
            }
            panic!("no suitable cell");
        })
        .await
}

async fn step(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

#[tokio::test(start_paused = true)]
async fn test_two_players_start_a_match() {
    let session = session(1);
    let (_, mut a) = join(&session, "alice").await;
    assert_eq!(session.with_room(|room| room.phase()).await, RoomPhase::Waiting);

    let (_, _b) = join(&session, "bob").await;
    let (phase, countdown) = session
        .with_room(|room| (room.phase(), room.match_start_countdown()))
        .await;
    assert_eq!(phase, RoomPhase::Countdown);
    assert_eq!(countdown, 10.0);

    step(10_050).await;

    let (phase, round) = session.with_room(|room| (room.phase(), room.round())).await;
    assert_eq!(phase, RoomPhase::RoundActive);
    assert_eq!(round, 1);

    let starts: Vec<_> = a
        .drain()
        .into_iter()
        .filter_map(|m| match m {
            ServerMessage::MatchStart(start) => Some(start),
            _ => None,
        })
        .collect();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].duration, 10.0);
    assert_eq!(starts[0].field.len(), 40 * 30);
}

#[tokio::test(start_paused = true)]
async fn test_off_color_player_is_eliminated_and_match_continues() {
    let session = session(2);
    let (_, a) = join(&session, "a").await;
    let (_, mut b) = join(&session, "b").await;
    let (_, c) = join(&session, "c").await;
    // 3 players: 10 - 2 = 8 s countdown.
    step(8_050).await;
    assert_eq!(session.with_room(|room| room.round()).await, 1);

    let (ox, oy) = cell_where(&session, true).await;
    let (fx, fy) = cell_where(&session, false).await;
    for (client, (x, y)) in [(&a, (ox, oy)), (&b, (fx, fy)), (&c, (ox, oy))] {
        session
            .handle_message(client.connection, ClientMessage::Move(MoveRequest { x, y }))
            .await;
    }
    b.drain();

    step(10_000).await;
    let (phase, alive) = session.with_room(|room| (room.phase(), room.alive_count())).await;
    assert_eq!(phase, RoomPhase::RoundResolving);
    assert_eq!(alive, 2);
    assert!(b.drain().iter().any(|m| matches!(
        m,
        ServerMessage::PlayerEliminated(result) if result.winner.as_deref() == Some(ELIMINATED_MARKER)
    )));

    step(2_000).await;
    let (phase, round) = session.with_room(|room| (room.phase(), room.round())).await;
    assert_eq!(phase, RoomPhase::RoundActive);
    assert_eq!(round, 2);
}

#[tokio::test(start_paused = true)]
async fn test_join_during_round_is_rejected() {
    let session = session(3);
    let (_, _a) = join(&session, "a").await;
    let (_, _b) = join(&session, "b").await;
    step(10_050).await;

    let mut late = connect(&session);
    session
        .handle_message(
            late.connection,
            ClientMessage::Connect(JoinRequest { player_name: Some("late".into()) }),
        )
        .await;

    let msgs = late.drain();
    assert!(msgs.iter().any(|m| matches!(
        m,
        ServerMessage::JoinRejected(r) if r.reason == "Cannot join: game already in progress"
    )));
    assert_eq!(session.with_room(|room| room.player_count()).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_mid_round_resets_room() {
    let session = session(4);
    let (_, a) = join(&session, "a").await;
    let (_, mut b) = join(&session, "b").await;
    step(10_050).await;
    let old_field = session.with_room(|room| room.field().clone()).await;
    b.drain();

    let keep_open = session
        .handle_message(a.connection, ClientMessage::Disconnect(LeaveRequest::default()))
        .await;
    assert!(!keep_open);
    session.disconnect(a.connection).await;

    let over = b
        .drain()
        .into_iter()
        .find_map(|m| match m {
            ServerMessage::GameOver(result) => Some(result),
            _ => None,
        })
        .unwrap();
    assert_eq!(over.winner, None);

    let (phase, round, field) = session
        .with_room(|room| (room.phase(), room.round(), room.field().clone()))
        .await;
    assert_eq!(phase, RoomPhase::Waiting);
    assert_eq!(round, 0);
    assert_ne!(field, old_field);

    // Stale round ticker must not revive anything.
    step(1_000).await;
    assert_eq!(session.with_room(|room| room.phase()).await, RoomPhase::Waiting);
}
