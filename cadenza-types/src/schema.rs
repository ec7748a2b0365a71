//! Runtime validation of entities, patches and change entries.
//!
//! Validation never panics; callers decide whether a failure means "reject
//! the mutation" (model store), "drop the entry" (change log) or "skip the
//! row" (snapshot loading).

use std::collections::BTreeMap;

use thiserror::Error;

use crate::{
    AudioEdge, AudioNode, CompositionMeta, KeyPatch, LayerPatch, MetadataPatch, MusicKey,
    MusicLayer, NodePatch, NodeType, Position, MAX_BPM, MAX_LABEL_LEN, MAX_NOTE, MIN_BPM,
};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("{field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} is longer than {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{node_type:?} has no property named '{name}'")]
    UnknownProperty { node_type: NodeType, name: String },
    #[error("property '{name}' is out of range: {value}")]
    PropertyOutOfRange { name: String, value: f64 },
    #[error("change entry carries no fields")]
    EmptyPatch,
    #[error("socket {socket} is out of range for {node_type:?}")]
    SocketOutOfRange { node_type: NodeType, socket: u8 },
    #[error("a node cannot be connected to itself")]
    SelfConnection,
}

pub type SchemaResult = Result<(), SchemaError>;

/// Shape and range checks that need no knowledge of the rest of the graph.
pub trait Validate {
    fn validate(&self) -> SchemaResult;
}

fn finite(field: &'static str, value: f64) -> SchemaResult {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SchemaError::NotFinite { field })
    }
}

fn in_range(field: &'static str, value: f64, min: f64, max: f64) -> SchemaResult {
    finite(field, value)?;
    if value < min || value > max {
        return Err(SchemaError::OutOfRange { field, value });
    }
    Ok(())
}

fn text(field: &'static str, value: &str, max: usize, allow_empty: bool) -> SchemaResult {
    if !allow_empty && value.trim().is_empty() {
        return Err(SchemaError::Empty { field });
    }
    if value.chars().count() > max {
        return Err(SchemaError::TooLong { field, max });
    }
    Ok(())
}

pub fn validate_position(position: &Position) -> SchemaResult {
    finite("position.x", position.x)?;
    finite("position.y", position.y)
}

pub fn validate_label(label: &str) -> SchemaResult {
    text("label", label, MAX_LABEL_LEN, true)
}

pub fn validate_layer_name(name: &str) -> SchemaResult {
    text("name", name, MAX_LABEL_LEN, false)
}

pub fn validate_note(note: u8) -> SchemaResult {
    if note > MAX_NOTE {
        return Err(SchemaError::OutOfRange { field: "note", value: note as f64 });
    }
    Ok(())
}

pub fn validate_time(time: f64) -> SchemaResult {
    in_range("time", time, 0.0, f64::MAX)
}

pub fn validate_duration(duration: f64) -> SchemaResult {
    finite("duration", duration)?;
    if duration <= 0.0 {
        return Err(SchemaError::OutOfRange { field: "duration", value: duration });
    }
    Ok(())
}

pub fn validate_velocity(velocity: f64) -> SchemaResult {
    in_range("velocity", velocity, 0.0, 1.0)
}

/// Check one property assignment against a node type's catalog entry.
pub fn validate_property(node_type: NodeType, name: &str, value: f64) -> SchemaResult {
    let spec = node_type
        .spec()
        .property(name)
        .ok_or_else(|| SchemaError::UnknownProperty { node_type, name: name.to_string() })?;
    if !spec.accepts(value) {
        return Err(SchemaError::PropertyOutOfRange { name: name.to_string(), value });
    }
    Ok(())
}

/// Property values only need to be finite without knowing the node type.
fn validate_property_values(props: &BTreeMap<String, f64>) -> SchemaResult {
    for value in props.values() {
        finite("properties", *value)?;
    }
    Ok(())
}

/// Keep only the property entries valid for `node_type`, logging each drop.
/// Used when loading rows that may predate a catalog change.
pub fn sanitize_properties(node_type: NodeType, props: BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    props
        .into_iter()
        .filter(|(name, value)| match validate_property(node_type, name, *value) {
            Ok(()) => true,
            Err(e) => {
                log::warn!(target: "types::schema", "dropping property: {}", e);
                false
            }
        })
        .collect()
}

impl Validate for AudioNode {
    fn validate(&self) -> SchemaResult {
        validate_label(&self.label)?;
        validate_position(&self.position)?;
        for (name, value) in &self.properties {
            validate_property(self.node_type, name, *value)?;
        }
        Ok(())
    }
}

impl Validate for NodePatch {
    fn validate(&self) -> SchemaResult {
        if self.is_empty() {
            return Err(SchemaError::EmptyPatch);
        }
        if let Some(label) = &self.label {
            validate_label(label)?;
        }
        if let Some(position) = &self.position {
            validate_position(position)?;
        }
        if let Some(props) = &self.properties {
            validate_property_values(props)?;
        }
        Ok(())
    }
}

impl Validate for AudioEdge {
    fn validate(&self) -> SchemaResult {
        // Socket bounds depend on the node types, see `validate_sockets`.
        if self.source.node_id == self.target.node_id {
            return Err(SchemaError::SelfConnection);
        }
        Ok(())
    }
}

/// Check an edge's socket indices against the declared socket counts of its
/// endpoint node types.
pub fn validate_sockets(edge: &AudioEdge, source_type: NodeType, target_type: NodeType) -> SchemaResult {
    if edge.source.socket >= source_type.spec().outputs {
        return Err(SchemaError::SocketOutOfRange { node_type: source_type, socket: edge.source.socket });
    }
    if edge.target.socket >= target_type.spec().inputs {
        return Err(SchemaError::SocketOutOfRange { node_type: target_type, socket: edge.target.socket });
    }
    Ok(())
}

impl Validate for MusicLayer {
    fn validate(&self) -> SchemaResult {
        validate_layer_name(&self.name)
    }
}

impl Validate for LayerPatch {
    fn validate(&self) -> SchemaResult {
        match &self.name {
            Some(name) => validate_layer_name(name),
            None => Err(SchemaError::EmptyPatch),
        }
    }
}

impl Validate for MusicKey {
    fn validate(&self) -> SchemaResult {
        validate_note(self.note)?;
        validate_time(self.time)?;
        validate_duration(self.duration)?;
        validate_velocity(self.velocity)
    }
}

impl Validate for KeyPatch {
    fn validate(&self) -> SchemaResult {
        if self.is_empty() {
            return Err(SchemaError::EmptyPatch);
        }
        if let Some(note) = self.note {
            validate_note(note)?;
        }
        if let Some(time) = self.time {
            validate_time(time)?;
        }
        if let Some(duration) = self.duration {
            validate_duration(duration)?;
        }
        if let Some(velocity) = self.velocity {
            validate_velocity(velocity)?;
        }
        Ok(())
    }
}

impl Validate for CompositionMeta {
    fn validate(&self) -> SchemaResult {
        text("name", &self.name, MAX_NAME_LEN, false)?;
        text("description", &self.description, MAX_DESCRIPTION_LEN, true)?;
        in_range("bpm", self.bpm, MIN_BPM, MAX_BPM)
    }
}

impl Validate for MetadataPatch {
    fn validate(&self) -> SchemaResult {
        if self.is_empty() {
            return Err(SchemaError::EmptyPatch);
        }
        if let Some(name) = &self.name {
            text("name", name, MAX_NAME_LEN, false)?;
        }
        if let Some(description) = &self.description {
            text("description", description, MAX_DESCRIPTION_LEN, true)?;
        }
        if let Some(bpm) = self.bpm {
            in_range("bpm", bpm, MIN_BPM, MAX_BPM)?;
        }
        Ok(())
    }
}
