//! Key scheduling against the backend transport.
//!
//! Key time and duration are measured in steps; `Tempo` converts them to
//! seconds. A key whose instrument has no live instrument unit is muted.

use cadenza_types::MusicKey;

use crate::engine::NoteEvent;
use crate::mirror::AudioMirror;
use crate::units::note_frequency;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    pub bpm: f64,
    pub steps_per_beat: u32,
}

impl Tempo {
    pub fn new(bpm: f64, steps_per_beat: u32) -> Self {
        Self { bpm, steps_per_beat }
    }

    pub fn secs_per_step(&self) -> f64 {
        60.0 / (self.bpm.max(1.0) * self.steps_per_beat.max(1) as f64)
    }

    pub fn steps_to_secs(&self, steps: f64) -> f64 {
        steps * self.secs_per_step()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Outcome of scheduling a set of keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub scheduled: usize,
    pub muted: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Transport {
    state: TransportState,
    stale: bool,
}

impl Transport {
    pub(crate) fn mark_stale(&mut self) {
        if self.state != TransportState::Stopped {
            self.stale = true;
        }
    }
}

impl AudioMirror {
    pub fn transport_state(&self) -> TransportState {
        self.transport.state
    }

    /// Whether key edits arrived since the current schedule was built.
    pub fn schedule_is_stale(&self) -> bool {
        self.transport.stale
    }

    fn schedule_keys<'a, K>(&mut self, keys: K, tempo: Tempo) -> ScheduleReport
    where
        K: IntoIterator<Item = &'a MusicKey>,
    {
        let mut report = ScheduleReport::default();
        for key in keys {
            let Some(unit) = self.instrument_unit(key.instrument_id) else {
                log::debug!(
                    target: "audio::mirror",
                    "key {} muted: instrument {} not available",
                    key.id,
                    key.instrument_id
                );
                report.muted += 1;
                continue;
            };
            let event = NoteEvent {
                frequency: note_frequency(key.note),
                offset_secs: tempo.steps_to_secs(key.time),
                duration_secs: tempo.steps_to_secs(key.duration),
                velocity: key.velocity,
            };
            match self.backend.schedule_note(unit, event) {
                Ok(()) => report.scheduled += 1,
                Err(e) => {
                    log::warn!(target: "audio::mirror", "key {} not scheduled: {}", key.id, e);
                    report.muted += 1;
                }
            }
        }
        self.transport.stale = false;
        report
    }

    /// Schedule every key and start the transport at `position_secs`.
    /// Does nothing before activation.
    pub fn start_playback<'a, K>(&mut self, keys: K, tempo: Tempo, position_secs: f64) -> ScheduleReport
    where
        K: IntoIterator<Item = &'a MusicKey>,
    {
        if !self.is_available() {
            return ScheduleReport::default();
        }
        if let Err(e) = self.backend.cancel_scheduled() {
            log::warn!(target: "audio::mirror", "cancel_scheduled failed: {}", e);
        }
        let report = self.schedule_keys(keys, tempo);
        match self.backend.start_transport(position_secs) {
            Ok(()) => self.transport.state = TransportState::Running,
            Err(e) => log::warn!(target: "audio::mirror", "start_transport failed: {}", e),
        }
        log::debug!(
            target: "audio::mirror",
            "playback started: {} scheduled, {} muted",
            report.scheduled,
            report.muted
        );
        report
    }

    pub fn pause_playback(&mut self) {
        if self.transport.state != TransportState::Running {
            return;
        }
        match self.backend.pause_transport() {
            Ok(()) => self.transport.state = TransportState::Paused,
            Err(e) => log::warn!(target: "audio::mirror", "pause_transport failed: {}", e),
        }
    }

    pub fn resume_playback(&mut self, position_secs: f64) {
        if self.transport.state != TransportState::Paused {
            return;
        }
        match self.backend.start_transport(position_secs) {
            Ok(()) => self.transport.state = TransportState::Running,
            Err(e) => log::warn!(target: "audio::mirror", "start_transport failed: {}", e),
        }
    }

    /// Stop the transport and cancel every scheduled note.
    pub fn stop_playback(&mut self) {
        if self.transport.state == TransportState::Stopped {
            return;
        }
        if let Err(e) = self.backend.stop_transport() {
            log::warn!(target: "audio::mirror", "stop_transport failed: {}", e);
        }
        if let Err(e) = self.backend.cancel_scheduled() {
            log::warn!(target: "audio::mirror", "cancel_scheduled failed: {}", e);
        }
        self.transport = Transport::default();
    }

    /// Rebuild the schedule if key edits made it stale. The transport keeps
    /// its position.
    pub fn reschedule<'a, K>(&mut self, keys: K, tempo: Tempo) -> Option<ScheduleReport>
    where
        K: IntoIterator<Item = &'a MusicKey>,
    {
        if !self.transport.stale || self.transport.state == TransportState::Stopped {
            return None;
        }
        if let Err(e) = self.backend.cancel_scheduled() {
            log::warn!(target: "audio::mirror", "cancel_scheduled failed: {}", e);
        }
        Some(self.schedule_keys(keys, tempo))
    }
}
