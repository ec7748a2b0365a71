//! Audio backend trait: a semantic-level abstraction over the audio platform.
//!
//! `AudioBackend` captures what the mirror *means* to do (construct a unit,
//! connect two sockets, set a parameter) independently of how the platform
//! does it. This enables testing the mirror without an audio device.

use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T = ()> = Result<T, BackendError>;

/// Error from a backend operation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

/// Handle of a constructed processing unit on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(u32);

impl UnitId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A note to sound on an instrument unit, relative to transport start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub frequency: f64,
    pub offset_secs: f64,
    pub duration_secs: f64,
    pub velocity: f64,
}

/// Semantic-level audio backend trait.
///
/// Each method represents a meaningful audio operation. Implementations
/// translate these into platform calls or record them for testing.
pub trait AudioBackend: Send {
    /// Resume the platform audio context. Platforms refuse this until a user
    /// gesture has happened.
    fn resume(&self) -> BackendResult;

    /// Construct a unit of the given kind with initial parameter values.
    fn create_unit(&self, unit: UnitId, kind: &str, params: &[(&str, f64)]) -> BackendResult;

    fn set_param(&self, unit: UnitId, param: &str, value: f64) -> BackendResult;

    /// Connect `source`'s output socket to `target`'s input socket.
    fn connect(&self, source: UnitId, output: u8, target: UnitId, input: u8) -> BackendResult;

    /// Disconnect one specific socket pair.
    fn disconnect(&self, source: UnitId, output: u8, target: UnitId, input: u8) -> BackendResult;

    /// Drop every connection into and out of `unit`.
    fn disconnect_all(&self, unit: UnitId) -> BackendResult;

    /// Release the unit's resources. The handle is invalid afterwards.
    fn dispose(&self, unit: UnitId) -> BackendResult;

    /// Schedule a note on an instrument unit against the transport clock.
    fn schedule_note(&self, unit: UnitId, event: NoteEvent) -> BackendResult;

    /// Start sounding a note immediately (live keyboard).
    fn trigger_attack(&self, unit: UnitId, frequency: f64, velocity: f64) -> BackendResult;

    fn trigger_release(&self, unit: UnitId, frequency: f64) -> BackendResult;

    fn start_transport(&self, position_secs: f64) -> BackendResult;

    fn pause_transport(&self) -> BackendResult;

    fn stop_transport(&self) -> BackendResult;

    /// Cancel every note scheduled with `schedule_note`.
    fn cancel_scheduled(&self) -> BackendResult;
}

// ─── Test Backend ───────────────────────────────────────────────────

/// An operation recorded by `TestBackend` for assertion in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOp {
    Resume,
    CreateUnit {
        unit: UnitId,
        kind: String,
        params: Vec<(String, f64)>,
    },
    SetParam {
        unit: UnitId,
        param: String,
        value: f64,
    },
    Connect {
        source: UnitId,
        output: u8,
        target: UnitId,
        input: u8,
    },
    Disconnect {
        source: UnitId,
        output: u8,
        target: UnitId,
        input: u8,
    },
    DisconnectAll(UnitId),
    Dispose(UnitId),
    ScheduleNote {
        unit: UnitId,
        event: NoteEvent,
    },
    TriggerAttack {
        unit: UnitId,
        frequency: f64,
        velocity: f64,
    },
    TriggerRelease {
        unit: UnitId,
        frequency: f64,
    },
    StartTransport(f64),
    PauseTransport,
    StopTransport,
    CancelScheduled,
}

/// A test backend that records all operations into a vector for assertions.
/// All operations succeed unless `refuse_resume` is set. Uses `Mutex` for
/// interior mutability so the backend is `Send + Sync`.
pub struct TestBackend {
    ops: Mutex<Vec<TestOp>>,
    refuse_resume: Mutex<bool>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            refuse_resume: Mutex::new(false),
        }
    }

    /// Make `resume` fail, as a platform does before any user gesture.
    pub fn set_refuse_resume(&self, refuse: bool) {
        *self.refuse_resume.lock().unwrap() = refuse;
    }

    /// Return all recorded operations.
    pub fn operations(&self) -> Vec<TestOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Clear recorded operations.
    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Count operations matching a predicate.
    pub fn count<F: Fn(&TestOp) -> bool>(&self, f: F) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| f(op)).count()
    }

    /// Find the first operation matching a predicate.
    pub fn find<F: Fn(&TestOp) -> bool>(&self, f: F) -> Option<TestOp> {
        self.ops.lock().unwrap().iter().find(|op| f(op)).cloned()
    }

    /// Return the kinds of all units created, in order.
    pub fn units_created(&self) -> Vec<(UnitId, String)> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                TestOp::CreateUnit { unit, kind, .. } => Some((*unit, kind.clone())),
                _ => None,
            })
            .collect()
    }

    /// Return all disposed units.
    pub fn units_disposed(&self) -> Vec<UnitId> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                TestOp::Dispose(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: TestOp) -> BackendResult {
        self.ops.lock().unwrap().push(op);
        Ok(())
    }
}

impl AudioBackend for TestBackend {
    fn resume(&self) -> BackendResult {
        if *self.refuse_resume.lock().unwrap() {
            return Err(BackendError("audio context requires a user gesture".to_string()));
        }
        self.record(TestOp::Resume)
    }

    fn create_unit(&self, unit: UnitId, kind: &str, params: &[(&str, f64)]) -> BackendResult {
        self.record(TestOp::CreateUnit {
            unit,
            kind: kind.to_string(),
            params: params.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        })
    }

    fn set_param(&self, unit: UnitId, param: &str, value: f64) -> BackendResult {
        self.record(TestOp::SetParam {
            unit,
            param: param.to_string(),
            value,
        })
    }

    fn connect(&self, source: UnitId, output: u8, target: UnitId, input: u8) -> BackendResult {
        self.record(TestOp::Connect { source, output, target, input })
    }

    fn disconnect(&self, source: UnitId, output: u8, target: UnitId, input: u8) -> BackendResult {
        self.record(TestOp::Disconnect { source, output, target, input })
    }

    fn disconnect_all(&self, unit: UnitId) -> BackendResult {
        self.record(TestOp::DisconnectAll(unit))
    }

    fn dispose(&self, unit: UnitId) -> BackendResult {
        self.record(TestOp::Dispose(unit))
    }

    fn schedule_note(&self, unit: UnitId, event: NoteEvent) -> BackendResult {
        self.record(TestOp::ScheduleNote { unit, event })
    }

    fn trigger_attack(&self, unit: UnitId, frequency: f64, velocity: f64) -> BackendResult {
        self.record(TestOp::TriggerAttack { unit, frequency, velocity })
    }

    fn trigger_release(&self, unit: UnitId, frequency: f64) -> BackendResult {
        self.record(TestOp::TriggerRelease { unit, frequency })
    }

    fn start_transport(&self, position_secs: f64) -> BackendResult {
        self.record(TestOp::StartTransport(position_secs))
    }

    fn pause_transport(&self) -> BackendResult {
        self.record(TestOp::PauseTransport)
    }

    fn stop_transport(&self) -> BackendResult {
        self.record(TestOp::StopTransport)
    }

    fn cancel_scheduled(&self) -> BackendResult {
        self.record(TestOp::CancelScheduled)
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps `Arc<TestBackend>` to implement `AudioBackend` so the mirror can
/// own a `Box<dyn AudioBackend>` while tests retain an `Arc` for assertions.
pub struct SharedTestBackend(pub Arc<TestBackend>);

impl AudioBackend for SharedTestBackend {
    fn resume(&self) -> BackendResult {
        self.0.resume()
    }
    fn create_unit(&self, unit: UnitId, kind: &str, params: &[(&str, f64)]) -> BackendResult {
        self.0.create_unit(unit, kind, params)
    }
    fn set_param(&self, unit: UnitId, param: &str, value: f64) -> BackendResult {
        self.0.set_param(unit, param, value)
    }
    fn connect(&self, source: UnitId, output: u8, target: UnitId, input: u8) -> BackendResult {
        self.0.connect(source, output, target, input)
    }
    fn disconnect(&self, source: UnitId, output: u8, target: UnitId, input: u8) -> BackendResult {
        self.0.disconnect(source, output, target, input)
    }
    fn disconnect_all(&self, unit: UnitId) -> BackendResult {
        self.0.disconnect_all(unit)
    }
    fn dispose(&self, unit: UnitId) -> BackendResult {
        self.0.dispose(unit)
    }
    fn schedule_note(&self, unit: UnitId, event: NoteEvent) -> BackendResult {
        self.0.schedule_note(unit, event)
    }
    fn trigger_attack(&self, unit: UnitId, frequency: f64, velocity: f64) -> BackendResult {
        self.0.trigger_attack(unit, frequency, velocity)
    }
    fn trigger_release(&self, unit: UnitId, frequency: f64) -> BackendResult {
        self.0.trigger_release(unit, frequency)
    }
    fn start_transport(&self, position_secs: f64) -> BackendResult {
        self.0.start_transport(position_secs)
    }
    fn pause_transport(&self) -> BackendResult {
        self.0.pause_transport()
    }
    fn stop_transport(&self) -> BackendResult {
        self.0.stop_transport()
    }
    fn cancel_scheduled(&self) -> BackendResult {
        self.0.cancel_scheduled()
    }
}

// ─── NullBackend ────────────────────────────────────────────────────

/// A no-op backend that silently succeeds. Useful as a default when no
/// audio device is available (headless sessions).
pub struct NullBackend;

impl AudioBackend for NullBackend {
    fn resume(&self) -> BackendResult { Ok(()) }
    fn create_unit(&self, _: UnitId, _: &str, _: &[(&str, f64)]) -> BackendResult { Ok(()) }
    fn set_param(&self, _: UnitId, _: &str, _: f64) -> BackendResult { Ok(()) }
    fn connect(&self, _: UnitId, _: u8, _: UnitId, _: u8) -> BackendResult { Ok(()) }
    fn disconnect(&self, _: UnitId, _: u8, _: UnitId, _: u8) -> BackendResult { Ok(()) }
    fn disconnect_all(&self, _: UnitId) -> BackendResult { Ok(()) }
    fn dispose(&self, _: UnitId) -> BackendResult { Ok(()) }
    fn schedule_note(&self, _: UnitId, _: NoteEvent) -> BackendResult { Ok(()) }
    fn trigger_attack(&self, _: UnitId, _: f64, _: f64) -> BackendResult { Ok(()) }
    fn trigger_release(&self, _: UnitId, _: f64) -> BackendResult { Ok(()) }
    fn start_transport(&self, _: f64) -> BackendResult { Ok(()) }
    fn pause_transport(&self) -> BackendResult { Ok(()) }
    fn stop_transport(&self) -> BackendResult { Ok(()) }
    fn cancel_scheduled(&self) -> BackendResult { Ok(()) }
}
