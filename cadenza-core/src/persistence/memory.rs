use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use cadenza_types::{ChangeSummary, CompositionId};

use super::{ChangePersistence, PersistenceError, PersistenceResult};

/// Records every summary it receives. Can be told to reject flushes.
#[derive(Default)]
pub struct MemoryPersistence {
    calls: Mutex<Vec<(CompositionId, ChangeSummary)>>,
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` flushes.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Reject every flush until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Summaries accepted so far, in order.
    pub fn calls(&self) -> Vec<(CompositionId, ChangeSummary)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of flush attempts, rejected ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl ChangePersistence for MemoryPersistence {
    fn apply_change_summary(
        &self,
        composition_id: CompositionId,
        summary: &ChangeSummary,
    ) -> PersistenceResult {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Rejected("storage unavailable".to_string()));
        }
        let consumed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(PersistenceError::Rejected("storage unavailable".to_string()));
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((composition_id, summary.clone()));
        }
        Ok(())
    }
}
