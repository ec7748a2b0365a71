use std::time::{Duration, Instant};

/// Persistence state of the edit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyState {
    /// Everything accepted so far has been persisted.
    #[default]
    Clean,
    /// Unflushed edits are waiting for the debounce deadline.
    Waiting,
    /// A flush is in flight and nothing new arrived since it started.
    Saving,
}

impl DirtyState {
    pub fn is_dirty(self) -> bool {
        !matches!(self, DirtyState::Clean)
    }
}

/// Trailing-edge timer. Every `touch` pushes the deadline out by the full
/// delay; the owner polls `is_due` with the current instant.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, deadline: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Restart the timer from `now`.
    pub fn touch(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Fire no earlier than `at`. Never pulls an existing deadline forward.
    pub fn not_before(&mut self, at: Instant) {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing > at => existing,
            _ => at,
        });
    }

    /// Fire at `at`, replacing any pending deadline.
    pub fn fire_at(&mut self, at: Instant) {
        self.deadline = Some(at);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}
