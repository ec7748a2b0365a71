#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Instant;

use cadenza_audio::engine::{SharedTestBackend, TestBackend};
use cadenza_audio::{AudioMirror, Destination};
use cadenza_core::config::Config;
use cadenza_core::dispatch::{FlushExecutor, FlushJob, InlineExecutor};
use cadenza_core::persistence::MemoryPersistence;
use cadenza_core::session::EditSession;
use cadenza_core::state::CompositionStore;
use cadenza_types::{CompositionId, CompositionMeta, KeyDraft};

pub struct Harness {
    pub session: EditSession,
    pub persistence: Arc<MemoryPersistence>,
    pub backend: Arc<TestBackend>,
}

/// Session over an empty composition with in-memory persistence, inline
/// flushes and a recording audio backend.
pub fn harness() -> Harness {
    harness_with_store(CompositionStore::new(CompositionId::new(1), CompositionMeta::default()))
}

pub fn harness_with_store(store: CompositionStore) -> Harness {
    let persistence = Arc::new(MemoryPersistence::new());
    let backend = Arc::new(TestBackend::new());
    let mirror = AudioMirror::new(Box::new(SharedTestBackend(backend.clone())), Destination::platform());
    let session = EditSession::with_executor(
        store,
        &Config::embedded(),
        persistence.clone(),
        Box::new(InlineExecutor),
        mirror,
    );
    Harness { session, persistence, backend }
}

/// An instant past the debounce window of every edit made so far.
pub fn after_debounce() -> Instant {
    Instant::now() + Config::embedded().save_debounce()
}

pub fn draft(time: f64, note: u8) -> KeyDraft {
    KeyDraft { time, note, duration: 4.0 }
}

/// Executor that parks jobs until the test runs them.
#[derive(Clone, Default)]
pub struct QueuedExecutor {
    jobs: Arc<Mutex<Vec<FlushJob>>>,
}

impl QueuedExecutor {
    pub fn pending(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Run the oldest parked job.
    pub fn run_next(&self) -> bool {
        let job = {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs.is_empty() {
                return false;
            }
            jobs.remove(0)
        };
        job.run();
        true
    }
}

impl FlushExecutor for QueuedExecutor {
    fn execute(&self, job: FlushJob) {
        self.jobs.lock().unwrap().push(job);
    }
}
