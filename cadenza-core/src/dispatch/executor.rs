use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;

use cadenza_types::{ChangeSummary, CompositionId};

use crate::persistence::{ChangePersistence, PersistenceError};

/// Completion of one flush, sent back to the dispatcher.
#[derive(Debug)]
pub struct FlushOutcome {
    pub generation: u64,
    pub result: Result<(), PersistenceError>,
}

/// One flush of a summary snapshot. Owns everything it needs, so it can
/// run on any thread.
pub struct FlushJob {
    pub generation: u64,
    pub composition_id: CompositionId,
    pub summary: ChangeSummary,
    pub(crate) persistence: Arc<dyn ChangePersistence>,
    pub(crate) feedback: Sender<FlushOutcome>,
}

impl FlushJob {
    pub fn run(self) {
        let result = self
            .persistence
            .apply_change_summary(self.composition_id, &self.summary);
        let outcome = FlushOutcome {
            generation: self.generation,
            result,
        };
        if self.feedback.send(outcome).is_err() {
            log::warn!(target: "core::dispatch", "flush {} finished after dispatcher went away", self.generation);
        }
    }
}

/// Where flush jobs run.
pub trait FlushExecutor: Send {
    fn execute(&self, job: FlushJob);
}

/// Runs each flush on its own background thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl FlushExecutor for ThreadExecutor {
    fn execute(&self, job: FlushJob) {
        let generation = job.generation;
        // the job moves into the closure; keep a way back if spawning fails
        let (tx, rx) = crossbeam_channel::bounded::<FlushJob>(1);
        let spawned = thread::Builder::new()
            .name(format!("cadenza-flush-{}", generation))
            .spawn(move || {
                if let Ok(job) = rx.recv() {
                    job.run();
                }
            });
        match spawned {
            Ok(_) => {
                if let Err(e) = tx.send(job) {
                    log::error!(target: "core::dispatch", "flush {} lost its worker, running inline", generation);
                    e.into_inner().run();
                }
            }
            Err(e) => {
                log::error!(target: "core::dispatch", "could not spawn flush thread ({}), running inline", e);
                job.run();
            }
        }
    }
}

/// Runs the flush on the calling thread before returning.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl FlushExecutor for InlineExecutor {
    fn execute(&self, job: FlushJob) {
        job.run();
    }
}
