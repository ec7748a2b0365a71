//! Change log: bounded, coalescing record of accepted edits.
//!
//! Every accepted entry is broadcast to each subscribed `ChangeFeed` (the
//! dispatch pipeline and the audio mirror), whether it was appended or
//! merged into the previous entry. The retained history is for undo
//! bookkeeping only; persistence works from the change summary, which folds
//! every entry as it is delivered.

use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use cadenza_types::{ChangeEntry, Validate};

/// Default number of retained entries before trimming.
pub const DEFAULT_CAPACITY: usize = 100;

/// A single entry in the change log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Monotonically increasing sequence number.
    pub seq: u64,
    pub change: ChangeEntry,
}

/// How an accepted entry landed in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Appended,
    /// Replaced the previous entry.
    Merged,
}

pub struct ChangeLog {
    entries: VecDeque<Arc<LogEntry>>,
    subscribers: Vec<Sender<Arc<LogEntry>>>,
    next_seq: u64,
    capacity: usize,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            subscribers: Vec::new(),
            next_seq: 0,
            capacity: capacity.max(1),
        }
    }

    /// Register a new consumer. It receives every entry accepted from now on.
    pub fn subscribe(&mut self) -> ChangeFeed {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        ChangeFeed { rx }
    }

    /// Validate and record a change.
    ///
    /// Invalid entries are logged and discarded (`None`). Otherwise the entry
    /// replaces the last one when the pair is mergeable, or is appended; the
    /// history is then trimmed from the front to capacity.
    pub fn apply_change(&mut self, change: ChangeEntry) -> Option<Placement> {
        if let Err(e) = change.validate() {
            log::warn!(target: "core::change_log", "discarding invalid {:?} entry: {}", change.kind(), e);
            return None;
        }

        let entry = Arc::new(LogEntry { seq: self.next_seq, change });
        self.next_seq += 1;

        let merges = self
            .entries
            .back()
            .is_some_and(|last| entry.change.merges_into(&last.change));
        let placement = if merges {
            if let Some(last) = self.entries.back_mut() {
                *last = Arc::clone(&entry);
            }
            Placement::Merged
        } else {
            self.entries.push_back(Arc::clone(&entry));
            Placement::Appended
        };

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }

        self.subscribers.retain(|tx| match tx.send(Arc::clone(&entry)) {
            Ok(()) => true,
            Err(_) => {
                log::debug!(target: "core::change_log", "dropping disconnected subscriber");
                false
            }
        });

        Some(placement)
    }

    /// Retained history, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().map(|e| e.as_ref())
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back().map(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current sequence counter (next entry will get this seq).
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of the change log.
pub struct ChangeFeed {
    rx: Receiver<Arc<LogEntry>>,
}

impl ChangeFeed {
    /// Take every entry delivered so far, in order.
    pub fn drain(&self) -> Vec<Arc<LogEntry>> {
        let mut entries = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(entry) => entries.push(entry),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        entries
    }
}
