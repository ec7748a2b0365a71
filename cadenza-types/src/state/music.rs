use serde::{Deserialize, Serialize};

use crate::{KeyId, LayerId, NodeId};

/// Highest addressable half-step index (B8 when 0 is C0).
pub const MAX_NOTE: u8 = 107;

/// A named lane grouping music keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicLayer {
    pub id: LayerId,
    pub name: String,
}

impl MusicLayer {
    pub fn apply(&mut self, patch: &LayerPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl LayerPatch {
    pub fn merge(&mut self, newer: &LayerPatch) {
        if newer.name.is_some() {
            self.name = newer.name.clone();
        }
    }

    pub fn field_set(&self) -> u8 {
        self.name.is_some() as u8
    }
}

/// A scheduled note event.
///
/// `instrument_id` may point at a node that no longer exists; such a key is
/// muted, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicKey {
    pub id: KeyId,
    pub layer_id: LayerId,
    pub instrument_id: NodeId,
    pub note: u8,
    /// Start, in sub-beat steps.
    pub time: f64,
    /// Length, in sub-beat steps.
    pub duration: f64,
    pub velocity: f64,
}

impl MusicKey {
    pub fn end(&self) -> f64 {
        self.time + self.duration
    }

    pub fn apply(&mut self, patch: &KeyPatch) {
        if let Some(layer_id) = patch.layer_id {
            self.layer_id = layer_id;
        }
        if let Some(instrument_id) = patch.instrument_id {
            self.instrument_id = instrument_id;
        }
        if let Some(note) = patch.note {
            self.note = note;
        }
        if let Some(time) = patch.time {
            self.time = time;
        }
        if let Some(duration) = patch.duration {
            self.duration = duration;
        }
        if let Some(velocity) = patch.velocity {
            self.velocity = velocity;
        }
    }
}

/// Placement draft for a new key (the velocity comes from configuration).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyDraft {
    pub time: f64,
    pub note: u8,
    pub duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_id: Option<LayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
}

impl KeyPatch {
    pub fn is_empty(&self) -> bool {
        self.field_set() == 0
    }

    pub fn merge(&mut self, newer: &KeyPatch) {
        if newer.layer_id.is_some() {
            self.layer_id = newer.layer_id;
        }
        if newer.instrument_id.is_some() {
            self.instrument_id = newer.instrument_id;
        }
        if newer.note.is_some() {
            self.note = newer.note;
        }
        if newer.time.is_some() {
            self.time = newer.time;
        }
        if newer.duration.is_some() {
            self.duration = newer.duration;
        }
        if newer.velocity.is_some() {
            self.velocity = newer.velocity;
        }
    }

    pub fn field_set(&self) -> u8 {
        (self.layer_id.is_some() as u8)
            | (self.instrument_id.is_some() as u8) << 1
            | (self.note.is_some() as u8) << 2
            | (self.time.is_some() as u8) << 3
            | (self.duration.is_some() as u8) << 4
            | (self.velocity.is_some() as u8) << 5
    }
}
