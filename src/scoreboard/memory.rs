//! In-memory ledger.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{rank, LedgerError, ScoreEntry, ScoreLedger, MIN_PERSISTED_SCORE};

/// Ledger that lives for the process lifetime.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    best: Mutex<BTreeMap<String, u32>>,
}

impl MemoryLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored best for a name.
    pub fn best(&self, name: &str) -> Option<u32> {
        let best = self.best.lock().unwrap_or_else(|e| e.into_inner());
        best.get(name).copied()
    }
}

impl ScoreLedger for MemoryLedger {
    fn record_if_better(&self, name: &str, score: u32) -> Result<bool, LedgerError> {
        if score < MIN_PERSISTED_SCORE {
            return Ok(false);
        }

        let mut best = self.best.lock().unwrap_or_else(|e| e.into_inner());
        match best.get_mut(name) {
            Some(current) if *current >= score => Ok(false),
            Some(current) => {
                *current = score;
                Ok(true)
            }
            None => {
                best.insert(name.to_string(), score);
                Ok(true)
            }
        }
    }

    fn top_n(&self, n: usize) -> Result<Vec<ScoreEntry>, LedgerError> {
        let best = self.best.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rank(best.iter().map(|(name, score)| (name, *score)), n))
    }
}
