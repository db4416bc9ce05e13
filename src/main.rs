//! Colorfloor Game Server
//!
//! Runs the single game room on a TCP listener.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use colorfloor::{
    VERSION,
    core::rng::DeterministicRng,
    game::settings::RoomSettings,
    network::server::{GameServer, ServerConfig},
    scoreboard::{DeferredLedger, MemoryLedger, ScoreLedger, SqliteLedger},
};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "colorfloor-server", version, about = "Colorfloor game room server")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "COLORFLOOR_BIND", default_value = "0.0.0.0:5556")]
    bind: SocketAddr,

    /// Maximum concurrent connections
    #[arg(long, env = "COLORFLOOR_MAX_CONNECTIONS", default_value_t = 256)]
    max_connections: usize,

    /// SQLite database holding best scores; kept in memory when absent
    #[arg(long, env = "COLORFLOOR_SCOREBOARD")]
    scoreboard: Option<PathBuf>,

    /// Fixed RNG seed (fields, targets, player ids)
    #[arg(long, env = "COLORFLOOR_SEED")]
    seed: Option<u64>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json")) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

/// Room ledger, plus the writer to drain on shutdown when scores go to disk.
fn open_ledger(
    path: Option<PathBuf>,
) -> anyhow::Result<(Arc<dyn ScoreLedger>, Option<Arc<DeferredLedger>>)> {
    match path {
        Some(path) => {
            let store = SqliteLedger::open(&path)
                .with_context(|| format!("opening scoreboard {}", path.display()))?;
            let deferred = Arc::new(
                DeferredLedger::spawn(Arc::new(store)).context("loading scoreboard")?,
            );
            info!("Scoreboard: {}", path.display());
            let ledger: Arc<dyn ScoreLedger> = deferred.clone();
            Ok((ledger, Some(deferred)))
        }
        None => {
            warn!("No scoreboard database given; best scores last until shutdown");
            let ledger: Arc<dyn ScoreLedger> = Arc::new(MemoryLedger::new());
            Ok((ledger, None))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    info!("Colorfloor Server v{}", VERSION);

    let (ledger, writer) = open_ledger(args.scoreboard)?;
    let rng = match args.seed {
        Some(seed) => {
            info!("RNG Seed: {}", seed);
            DeterministicRng::new(seed)
        }
        None => DeterministicRng::from_entropy(),
    };

    let config = ServerConfig {
        bind_addr: args.bind,
        max_connections: args.max_connections,
        ..Default::default()
    };
    let server = Arc::new(GameServer::new(config, RoomSettings::default(), rng, ledger));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            signal_server.shutdown();
        }
    });

    let outcome = server.run().await.context("game server failed");

    if let Some(writer) = writer {
        writer.flush().await;
        info!("Scoreboard flushed");
    }
    outcome
}
