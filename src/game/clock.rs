//! Round/Match Clock
//!
//! Drives the room's time-based transitions with tokio timers. The room never
//! touches tokio itself: it queues [`TimerRequest`]s tagged with its current
//! generation, and [`schedule`] turns them into tasks. A task whose
//! generation has been superseded finds the room ignoring it and exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::trace;

use crate::game::room::Room;

/// Room shared between connections and timer tasks.
pub type SharedRoom = Arc<Mutex<Room>>;

/// Monotonic tag identifying the timers valid for one phase.
pub type Generation = u64;

/// Timer the room wants started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRequest {
    /// Periodic tick feeding `Room::on_tick` until it returns `false`.
    Ticker {
        /// Generation the ticker belongs to.
        generation: Generation,
        /// Tick period.
        period: Duration,
    },
    /// One-shot feeding `Room::on_resolution_elapsed`.
    ResolutionDelay {
        /// Generation the delay belongs to.
        generation: Generation,
        /// Delay length.
        delay: Duration,
    },
}

impl TimerRequest {
    /// Generation the timer belongs to.
    pub fn generation(&self) -> Generation {
        match self {
            TimerRequest::Ticker { generation, .. } => *generation,
            TimerRequest::ResolutionDelay { generation, .. } => *generation,
        }
    }
}

/// Start a task for every request.
pub fn schedule(room: &SharedRoom, requests: Vec<TimerRequest>) {
    for request in requests {
        match request {
            TimerRequest::Ticker { generation, period } => {
                tokio::spawn(run_ticker(room.clone(), generation, period));
            }
            TimerRequest::ResolutionDelay { generation, delay } => {
                tokio::spawn(run_resolution_delay(room.clone(), generation, delay));
            }
        }
    }
}

/// Ticks are awaited one after another, and each holds the room lock for its
/// whole run, so ticks never overlap each other or any other room operation.
async fn run_ticker(room: SharedRoom, generation: Generation, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let (keep_going, next) = {
            let mut room = room.lock().await;
            let keep_going = room.on_tick(generation);
            (keep_going, room.take_timer_requests())
        };
        schedule(&room, next);

        if !keep_going {
            trace!("Ticker for generation {} stopped", generation);
            break;
        }
    }
}

async fn run_resolution_delay(room: SharedRoom, generation: Generation, delay: Duration) {
    sleep(delay).await;

    let next = {
        let mut room = room.lock().await;
        room.on_resolution_elapsed(generation);
        room.take_timer_requests()
    };
    schedule(&room, next);
}
