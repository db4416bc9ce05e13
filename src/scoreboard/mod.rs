//! Score Ledger
//!
//! Durable best-score-per-name store. The room records results through the
//! [`ScoreLedger`] trait and reads the leaderboard back for GAME_OVER and
//! PLAYER_ELIMINATED messages.
//!
//! - `memory`: in-process ledger (default, tests)
//! - `sqlite`: SQLite database on disk
//! - `deferred`: write-behind wrapper so storage I/O stays off the room lock

pub mod deferred;
pub mod memory;
pub mod sqlite;

use serde::{Serialize, Deserialize};

pub use deferred::DeferredLedger;
pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

/// Scores below this are not worth keeping.
pub const MIN_PERSISTED_SCORE: u32 = 5;

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    /// Player name (the ledger key).
    pub player_name: String,
    /// Best score ever recorded for that name.
    pub best_score: u32,
}

/// Ledger failures.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Best-score store.
///
/// `record_if_better` must be an atomic upsert: concurrent callers never
/// lower a stored best.
pub trait ScoreLedger: Send + Sync {
    /// Store `score` for `name` if it beats the stored best.
    ///
    /// Returns `true` when the stored best changed. Scores below
    /// [`MIN_PERSISTED_SCORE`] are ignored.
    fn record_if_better(&self, name: &str, score: u32) -> Result<bool, LedgerError>;

    /// Up to `n` entries ordered by score (desc), then name (asc).
    fn top_n(&self, n: usize) -> Result<Vec<ScoreEntry>, LedgerError>;
}

/// Order rows best first, ties by name, and cut to `n`.
pub(crate) fn rank<'a, I>(rows: I, n: usize) -> Vec<ScoreEntry>
where
    I: IntoIterator<Item = (&'a String, u32)>,
{
    let mut entries: Vec<ScoreEntry> = rows
        .into_iter()
        .map(|(name, best_score)| ScoreEntry { player_name: name.clone(), best_score })
        .collect();
    entries.sort_by(|a, b| {
        b.best_score
            .cmp(&a.best_score)
            .then_with(|| a.player_name.cmp(&b.player_name))
    });
    entries.truncate(n);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_orders_and_truncates() {
        let rows = [
            ("carol".to_string(), 5),
            ("alice".to_string(), 9),
            ("bob".to_string(), 9),
            ("dave".to_string(), 6),
        ];
        let ranked = rank(rows.iter().map(|(n, s)| (n, *s)), 3);

        let names: Vec<&str> = ranked.iter().map(|e| e.player_name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "dave"]);
    }
}
