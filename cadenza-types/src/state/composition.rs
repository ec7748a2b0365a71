use serde::{Deserialize, Serialize};

pub const DEFAULT_BPM: f64 = 120.0;
pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 300.0;

/// Editable metadata of the composition root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_bpm")]
    pub bpm: f64,
}

fn default_bpm() -> f64 {
    DEFAULT_BPM
}

impl Default for CompositionMeta {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            description: String::new(),
            bpm: DEFAULT_BPM,
        }
    }
}

impl CompositionMeta {
    pub fn apply(&mut self, patch: &MetadataPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(bpm) = patch.bpm {
            self.bpm = bpm;
        }
    }
}

/// Partial metadata update. `None` fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.bpm.is_none()
    }

    /// Field-by-field overwrite: fields set in `newer` win.
    pub fn merge(&mut self, newer: &MetadataPatch) {
        if newer.name.is_some() {
            self.name = newer.name.clone();
        }
        if newer.description.is_some() {
            self.description = newer.description.clone();
        }
        if newer.bpm.is_some() {
            self.bpm = newer.bpm;
        }
    }

    /// Bitmask of the fields that are set, used by merge predicates.
    pub fn field_set(&self) -> u8 {
        (self.name.is_some() as u8) | (self.description.is_some() as u8) << 1 | (self.bpm.is_some() as u8) << 2
    }
}
