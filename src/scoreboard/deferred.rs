//! Write-behind ledger.
//!
//! Reads are served from an in-memory mirror. Improvements are queued to a
//! blocking worker that owns the durable store, so the room never waits on
//! storage while it holds its lock.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::{LedgerError, MemoryLedger, ScoreEntry, ScoreLedger};

enum Job {
    Record { name: String, score: u32 },
    Flush(oneshot::Sender<()>),
}

/// Mirror in front of a slow [`ScoreLedger`].
pub struct DeferredLedger {
    mirror: MemoryLedger,
    jobs: mpsc::UnboundedSender<Job>,
}

impl DeferredLedger {
    /// Preload the mirror from `store` and start the writer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn ScoreLedger>) -> Result<Self, LedgerError> {
        let mirror = MemoryLedger::new();
        for entry in store.top_n(usize::MAX)? {
            mirror.record_if_better(&entry.player_name, entry.best_score)?;
        }

        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::task::spawn_blocking(move || run_writer(store, rx));

        Ok(Self { mirror, jobs })
    }

    /// Wait until every write queued so far has reached the store.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.jobs.send(Job::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

fn run_writer(store: Arc<dyn ScoreLedger>, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.blocking_recv() {
        match job {
            Job::Record { name, score } => {
                if let Err(e) = store.record_if_better(&name, score) {
                    error!("Scoreboard write for {} failed: {}", name, e);
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Scoreboard writer stopped");
}

impl ScoreLedger for DeferredLedger {
    fn record_if_better(&self, name: &str, score: u32) -> Result<bool, LedgerError> {
        let improved = self.mirror.record_if_better(name, score)?;
        if improved {
            let job = Job::Record { name: name.to_string(), score };
            if self.jobs.send(job).is_err() {
                warn!("Scoreboard writer gone, {} -> {} kept in memory only", name, score);
            }
        }
        Ok(improved)
    }

    fn top_n(&self, n: usize) -> Result<Vec<ScoreEntry>, LedgerError> {
        self.mirror.top_n(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoreboard::SqliteLedger;

    #[tokio::test]
    async fn test_writes_reach_store_after_flush() {
        let store = Arc::new(SqliteLedger::in_memory().unwrap());
        let ledger = DeferredLedger::spawn(store.clone()).unwrap();

        assert!(ledger.record_if_better("alice", 7).unwrap());
        assert!(!ledger.record_if_better("alice", 6).unwrap());
        assert!(!ledger.record_if_better("bob", 3).unwrap());
        assert_eq!(ledger.top_n(10).unwrap().len(), 1);

        ledger.flush().await;
        let stored = store.top_n(10).unwrap();
        assert_eq!(stored, vec![ScoreEntry { player_name: "alice".into(), best_score: 7 }]);
    }

    #[tokio::test]
    async fn test_mirror_preloaded_from_store() {
        let store = Arc::new(SqliteLedger::in_memory().unwrap());
        store.record_if_better("carol", 12).unwrap();

        let ledger = DeferredLedger::spawn(store.clone()).unwrap();
        assert!(!ledger.record_if_better("carol", 10).unwrap());
        assert_eq!(ledger.top_n(1).unwrap()[0].best_score, 12);
    }

    struct FailingStore;

    impl ScoreLedger for FailingStore {
        fn record_if_better(&self, _: &str, _: u32) -> Result<bool, LedgerError> {
            Err(LedgerError::Database(rusqlite::Error::InvalidQuery))
        }

        fn top_n(&self, _: usize) -> Result<Vec<ScoreEntry>, LedgerError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_store_failure_keeps_mirror() {
        let ledger = DeferredLedger::spawn(Arc::new(FailingStore)).unwrap();

        assert!(ledger.record_if_better("dave", 9).unwrap());
        ledger.flush().await;
        assert_eq!(ledger.top_n(10).unwrap()[0].player_name, "dave");
    }
}
