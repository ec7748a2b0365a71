//! Change dispatch: debounced, single-flight flushing of the change summary.
//!
//! The dispatcher folds every accepted change into a `ChangeSummary`. Once the
//! debounce deadline passes it hands the whole summary to a `FlushJob` and
//! starts a fresh one, so edits made while the flush is in flight land in the
//! next window. At most one flush runs at a time; a deadline that passes
//! while one is in flight is honoured after it completes.
//!
//! Time is passed in explicitly (`now: Instant`) so the state machine can be
//! driven deterministically.

mod debounce;
mod executor;
mod guard;

pub use debounce::{Debouncer, DirtyState};
pub use executor::{FlushExecutor, FlushJob, FlushOutcome, InlineExecutor, ThreadExecutor};
pub use guard::{FlagGuard, NoopGuard, UnloadGuard};

use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use cadenza_types::reduce::apply_change_to_summary;
use cadenza_types::{ChangeEntry, ChangeSummary, CompositionId};

use crate::config::Config;
use crate::persistence::ChangePersistence;

/// Timing knobs for the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchConfig {
    pub debounce: Duration,
    pub retry_base: Duration,
    pub retry_max: Duration,
}

impl DispatchConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: config.save_debounce(),
            retry_base: config.retry_base(),
            retry_max: config.retry_max(),
        }
    }

    /// Backoff before retry number `failures` (1-based).
    pub fn retry_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.retry_base.saturating_mul(factor).min(self.retry_max)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2000),
            retry_base: Duration::from_millis(1000),
            retry_max: Duration::from_millis(60_000),
        }
    }
}

/// Snapshot currently being written.
struct InFlight {
    generation: u64,
    summary: ChangeSummary,
    started: Instant,
}

pub struct ChangeDispatcher {
    composition_id: CompositionId,
    config: DispatchConfig,
    persistence: Arc<dyn ChangePersistence>,
    executor: Box<dyn FlushExecutor>,
    guard: Box<dyn UnloadGuard>,
    guard_armed: bool,

    state: DirtyState,
    summary: ChangeSummary,
    debounce: Debouncer,
    in_flight: Option<InFlight>,
    generation: u64,
    failures: u32,
    retry_at: Option<Instant>,
    last_error: Option<String>,

    feedback_tx: Sender<FlushOutcome>,
    feedback_rx: Receiver<FlushOutcome>,
}

impl ChangeDispatcher {
    pub fn new(
        composition_id: CompositionId,
        config: DispatchConfig,
        persistence: Arc<dyn ChangePersistence>,
        executor: Box<dyn FlushExecutor>,
    ) -> Self {
        let (feedback_tx, feedback_rx) = crossbeam_channel::unbounded();
        Self {
            composition_id,
            config,
            persistence,
            executor,
            guard: Box::new(NoopGuard),
            guard_armed: false,
            state: DirtyState::Clean,
            summary: ChangeSummary::new(),
            debounce: Debouncer::new(config.debounce),
            in_flight: None,
            generation: 0,
            failures: 0,
            retry_at: None,
            last_error: None,
            feedback_tx,
            feedback_rx,
        }
    }

    /// Replace the unload guard, carrying over the armed state.
    pub fn set_guard(&mut self, guard: Box<dyn UnloadGuard>) {
        if self.guard_armed {
            self.guard.release();
        }
        self.guard = guard;
        if self.guard_armed {
            self.guard.arm();
        }
    }

    /// Release the guard regardless of state. Used when the session closes.
    pub fn release_guard(&mut self) {
        if self.guard_armed {
            self.guard.release();
            self.guard_armed = false;
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn state(&self) -> DirtyState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }

    /// Changes accumulated since the last flush started.
    pub fn pending(&self) -> &ChangeSummary {
        &self.summary
    }

    pub fn is_flushing(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Consecutive failed flushes.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// When the next flush becomes eligible, if one is scheduled.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn guard_armed(&self) -> bool {
        self.guard_armed
    }

    // ------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------

    /// Fold one accepted change and restart the debounce window. The save
    /// marker is ignored.
    pub fn observe(&mut self, change: &ChangeEntry, now: Instant) {
        if change.is_save_marker() {
            return;
        }
        apply_change_to_summary(change, &mut self.summary);
        self.state = DirtyState::Waiting;
        self.debounce.touch(now);
        if let Some(retry_at) = self.retry_at {
            self.debounce.not_before(retry_at);
        }
        self.sync_guard();
    }

    /// Apply finished flushes, then start a new one if the deadline passed
    /// and nothing is in flight. Returns true when a flush was started.
    pub fn poll(&mut self, now: Instant) -> bool {
        self.drain_feedback(now);
        if self.in_flight.is_some() || !self.debounce.is_due(now) {
            return false;
        }
        let started = self.start_flush(now);
        // inline executors have already reported back
        self.drain_feedback(now);
        started
    }

    /// Flush immediately, skipping the debounce and any retry backoff. If a
    /// flush is in flight the next one starts as soon as it completes.
    pub fn flush_now(&mut self, now: Instant) -> bool {
        self.drain_feedback(now);
        if self.in_flight.is_some() {
            if !self.summary.is_empty() {
                self.retry_at = None;
                self.debounce.fire_at(now);
            }
            return false;
        }
        self.retry_at = None;
        let started = self.start_flush(now);
        self.drain_feedback(now);
        started
    }

    /// Apply every completion that has arrived. Returns how many were applied.
    pub fn drain_feedback(&mut self, now: Instant) -> usize {
        let mut applied = 0;
        while let Ok(outcome) = self.feedback_rx.try_recv() {
            self.complete(outcome, now);
            applied += 1;
        }
        applied
    }

    /// Block until no flush is in flight or `timeout` elapses. Returns true
    /// when idle.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let give_up = Instant::now() + timeout;
        while self.in_flight.is_some() {
            let remaining = give_up.saturating_duration_since(Instant::now());
            match self.feedback_rx.recv_timeout(remaining) {
                Ok(outcome) => self.complete(outcome, Instant::now()),
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(target: "core::dispatch", "flush still in flight after {:?}", timeout);
                    return false;
                }
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn start_flush(&mut self, now: Instant) -> bool {
        self.debounce.cancel();
        if self.summary.is_empty() {
            self.state = DirtyState::Clean;
            self.sync_guard();
            return false;
        }

        let summary = mem::take(&mut self.summary);
        self.generation += 1;
        let generation = self.generation;
        log::debug!(
            target: "core::dispatch",
            "flush {} started: {} pending entities",
            generation,
            summary.entity_count()
        );

        self.in_flight = Some(InFlight {
            generation,
            summary: summary.clone(),
            started: now,
        });
        self.state = DirtyState::Saving;
        self.executor.execute(FlushJob {
            generation,
            composition_id: self.composition_id,
            summary,
            persistence: Arc::clone(&self.persistence),
            feedback: self.feedback_tx.clone(),
        });
        true
    }

    fn complete(&mut self, outcome: FlushOutcome, now: Instant) {
        let in_flight = match self.in_flight.take() {
            Some(f) if f.generation == outcome.generation => f,
            other => {
                log::warn!(target: "core::dispatch", "ignoring stale completion of flush {}", outcome.generation);
                self.in_flight = other;
                return;
            }
        };

        match outcome.result {
            Ok(()) => {
                log::info!(
                    target: "core::dispatch",
                    "flush {} saved in {:?}",
                    in_flight.generation,
                    now.saturating_duration_since(in_flight.started)
                );
                self.failures = 0;
                self.retry_at = None;
                self.last_error = None;
                if self.state == DirtyState::Saving {
                    self.state = DirtyState::Clean;
                }
            }
            Err(e) => {
                self.failures += 1;
                let backoff = self.config.retry_delay(self.failures);
                log::warn!(
                    target: "core::dispatch",
                    "flush {} failed ({}), retry {} in {:?}",
                    in_flight.generation,
                    e,
                    self.failures,
                    backoff
                );
                self.last_error = Some(e.to_string());

                // the failed snapshot goes back underneath newer edits
                let mut restored = in_flight.summary;
                restored.absorb(mem::take(&mut self.summary));
                self.summary = restored;
                self.state = DirtyState::Waiting;
                self.retry_at = Some(now + backoff);
                self.debounce.not_before(now + backoff);
            }
        }
        self.sync_guard();
    }

    fn sync_guard(&mut self) {
        let dirty = self.state.is_dirty();
        if dirty && !self.guard_armed {
            self.guard.arm();
            self.guard_armed = true;
        } else if !dirty && self.guard_armed {
            self.guard.release();
            self.guard_armed = false;
        }
    }
}
