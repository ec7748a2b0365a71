use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Host hook asking the user to confirm before leaving with unsaved edits.
/// Armed while the session is dirty, released once it is clean again.
pub trait UnloadGuard: Send {
    fn arm(&mut self);
    fn release(&mut self);
}

/// Guard for hosts with nothing to protect.
#[derive(Debug, Default)]
pub struct NoopGuard;

impl UnloadGuard for NoopGuard {
    fn arm(&mut self) {}
    fn release(&mut self) {}
}

/// Guard exposing its state through a shared flag the host can poll.
#[derive(Debug, Default, Clone)]
pub struct FlagGuard {
    armed: Arc<AtomicBool>,
}

impl FlagGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

impl UnloadGuard for FlagGuard {
    fn arm(&mut self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    fn release(&mut self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}
