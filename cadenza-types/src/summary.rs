//! The change summary: per-entity pending operations awaiting a flush.
//!
//! Unlike the change log, the summary is the source of truth for what gets
//! persisted. It is filled by `reduce::apply_change_to_summary` on every
//! accepted change and handed off wholesale when a flush starts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    AudioEdge, AudioNode, EdgeId, KeyId, KeyPatch, LayerId, LayerPatch, MetadataPatch, MusicKey,
    MusicLayer, NodeId, NodePatch,
};

/// Pending persistence operation for one entity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum Pending<T, P> {
    /// Create with the full entity (amended in place by later updates).
    Create(T),
    /// Field-wise update of an entity that already exists in storage.
    Update(P),
    Remove,
}

impl<T, P> Pending<T, P> {
    pub fn is_remove(&self) -> bool {
        matches!(self, Pending::Remove)
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Pending::Create(_) => "create",
            Pending::Update(_) => "update",
            Pending::Remove => "remove",
        }
    }
}

/// Edges are immutable once created, so they only have create and remove.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum EdgePending {
    Create(AudioEdge),
    Remove,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataPatch>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nodes: BTreeMap<NodeId, Pending<AudioNode, NodePatch>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub edges: BTreeMap<EdgeId, EdgePending>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub layers: BTreeMap<LayerId, Pending<MusicLayer, LayerPatch>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<KeyId, Pending<MusicKey, KeyPatch>>,
}

impl ChangeSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_none()
            && self.nodes.is_empty()
            && self.edges.is_empty()
            && self.layers.is_empty()
            && self.keys.is_empty()
    }

    /// Number of entities with a pending operation (metadata counts as one).
    pub fn entity_count(&self) -> usize {
        self.metadata.is_some() as usize
            + self.nodes.len()
            + self.edges.len()
            + self.layers.len()
            + self.keys.len()
    }
}
