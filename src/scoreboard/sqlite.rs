//! SQLite ledger.
//!
//! One `scoreboard` row per player name. The best-score rule lives in the
//! upsert itself, so the database never holds a lower score than it has
//! seen.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{LedgerError, ScoreEntry, ScoreLedger, MIN_PERSISTED_SCORE};

/// Stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    /// Best score for the name.
    pub best_score: u32,
    /// When `best_score` last changed.
    pub updated_at: DateTime<Utc>,
}

/// Ledger persisted in a SQLite database.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let conn = Connection::open(path.as_ref())?;
        let ledger = Self::with_connection(conn)?;
        info!("Scoreboard database {} ready", path.as_ref().display());
        Ok(ledger)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self, LedgerError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS scoreboard (
                player_name TEXT PRIMARY KEY,
                score INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Stored row for a name.
    pub fn record(&self, name: &str) -> Result<Option<LedgerRecord>, LedgerError> {
        let conn = self.lock();
        let record = conn
            .query_row(
                "SELECT score, updated_at FROM scoreboard WHERE player_name = ?1",
                params![name],
                |row| {
                    Ok(LedgerRecord {
                        best_score: row.get(0)?,
                        updated_at: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ScoreLedger for SqliteLedger {
    fn record_if_better(&self, name: &str, score: u32) -> Result<bool, LedgerError> {
        if score < MIN_PERSISTED_SCORE {
            return Ok(false);
        }

        let changed = self.lock().execute(
            "INSERT INTO scoreboard (player_name, score, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(player_name)
             DO UPDATE SET score = excluded.score, updated_at = excluded.updated_at
             WHERE excluded.score > scoreboard.score",
            params![name, score, Utc::now()],
        )?;

        if changed > 0 {
            debug!("Scoreboard: {} -> {}", name, score);
        }
        Ok(changed > 0)
    }

    fn top_n(&self, n: usize) -> Result<Vec<ScoreEntry>, LedgerError> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT player_name, score FROM scoreboard
             ORDER BY score DESC, player_name ASC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], |row| {
            Ok(ScoreEntry {
                player_name: row.get(0)?,
                best_score: row.get(1)?,
            })
        })?;

        let entries = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("colorfloor-ledger-{}.db", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_upsert_keeps_best() {
        let ledger = SqliteLedger::in_memory().unwrap();

        assert!(ledger.record_if_better("alice", 7).unwrap());
        assert!(!ledger.record_if_better("alice", 6).unwrap());
        assert!(!ledger.record_if_better("alice", 7).unwrap());
        assert!(ledger.record_if_better("alice", 9).unwrap());

        assert_eq!(ledger.record("alice").unwrap().unwrap().best_score, 9);
        assert!(ledger.record("nobody").unwrap().is_none());
    }

    #[test]
    fn test_low_scores_ignored() {
        let ledger = SqliteLedger::in_memory().unwrap();
        assert!(!ledger.record_if_better("alice", 4).unwrap());
        assert!(ledger.top_n(10).unwrap().is_empty());
    }

    #[test]
    fn test_top_n_order_and_limit() {
        let ledger = SqliteLedger::in_memory().unwrap();
        for (name, score) in [("carol", 5), ("bob", 9), ("alice", 9), ("dave", 6)] {
            ledger.record_if_better(name, score).unwrap();
        }

        let names: Vec<String> = ledger
            .top_n(3)
            .unwrap()
            .into_iter()
            .map(|e| e.player_name)
            .collect();
        assert_eq!(names, vec!["alice", "bob", "dave"]);
        assert_eq!(ledger.top_n(usize::MAX).unwrap().len(), 4);
    }

    #[test]
    fn test_persists_across_reopen() {
        let path = scratch_path();
        {
            let ledger = SqliteLedger::open(&path).unwrap();
            ledger.record_if_better("alice", 7).unwrap();
            ledger.record_if_better("bob", 11).unwrap();
        }

        let reopened = SqliteLedger::open(&path).unwrap();
        let top = reopened.top_n(10).unwrap();
        assert_eq!(top[0], ScoreEntry { player_name: "bob".into(), best_score: 11 });
        assert_eq!(top[1], ScoreEntry { player_name: "alice".into(), best_score: 7 });

        drop(reopened);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_unopenable_path_is_error() {
        let path = std::env::temp_dir()
            .join(format!("colorfloor-missing-{}", uuid::Uuid::new_v4()))
            .join("ledger.db");

        let err = SqliteLedger::open(&path).err().unwrap();
        assert!(matches!(err, LedgerError::Database(_)));
    }
}
