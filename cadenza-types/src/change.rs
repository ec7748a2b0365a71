//! Change entries: one semantic edit record per mutating operation.
//!
//! Entries flow from the model store into the change log and fan out to the
//! dispatch pipeline (folded into a `ChangeSummary`) and the audio mirror.

use serde::{Deserialize, Serialize};

use crate::schema::{SchemaResult, Validate};
use crate::{
    AudioEdge, AudioNode, EdgeId, KeyId, KeyPatch, LayerId, LayerPatch, MetadataPatch, MusicKey,
    MusicLayer, NodeId, NodePatch,
};

/// Wire shape is a discriminated union tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChangeEntry {
    /// Marker appended when a flush starts, so later edits never coalesce
    /// into an entry that predates the save.
    SaveChanges,
    MetadataUpdate { patch: MetadataPatch },
    NodeAdd { node: AudioNode },
    NodeUpdate { id: NodeId, patch: NodePatch },
    NodeRemove { id: NodeId },
    EdgeAdd { edge: AudioEdge },
    EdgeRemove { id: EdgeId },
    LayerAdd { layer: MusicLayer },
    LayerUpdate { id: LayerId, patch: LayerPatch },
    LayerRemove { id: LayerId },
    MusicKeyAdd { key: MusicKey },
    MusicKeyUpdate { id: KeyId, patch: KeyPatch },
    MusicKeyRemove { id: KeyId },
}

/// Fieldless discriminant of a `ChangeEntry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    SaveChanges,
    MetadataUpdate,
    NodeAdd,
    NodeUpdate,
    NodeRemove,
    EdgeAdd,
    EdgeRemove,
    LayerAdd,
    LayerUpdate,
    LayerRemove,
    MusicKeyAdd,
    MusicKeyUpdate,
    MusicKeyRemove,
}

impl ChangeEntry {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEntry::SaveChanges => ChangeKind::SaveChanges,
            ChangeEntry::MetadataUpdate { .. } => ChangeKind::MetadataUpdate,
            ChangeEntry::NodeAdd { .. } => ChangeKind::NodeAdd,
            ChangeEntry::NodeUpdate { .. } => ChangeKind::NodeUpdate,
            ChangeEntry::NodeRemove { .. } => ChangeKind::NodeRemove,
            ChangeEntry::EdgeAdd { .. } => ChangeKind::EdgeAdd,
            ChangeEntry::EdgeRemove { .. } => ChangeKind::EdgeRemove,
            ChangeEntry::LayerAdd { .. } => ChangeKind::LayerAdd,
            ChangeEntry::LayerUpdate { .. } => ChangeKind::LayerUpdate,
            ChangeEntry::LayerRemove { .. } => ChangeKind::LayerRemove,
            ChangeEntry::MusicKeyAdd { .. } => ChangeKind::MusicKeyAdd,
            ChangeEntry::MusicKeyUpdate { .. } => ChangeKind::MusicKeyUpdate,
            ChangeEntry::MusicKeyRemove { .. } => ChangeKind::MusicKeyRemove,
        }
    }

    pub fn is_save_marker(&self) -> bool {
        matches!(self, ChangeEntry::SaveChanges)
    }

    /// Whether this entry, arriving right after `last`, may replace it in the
    /// log instead of being appended.
    ///
    /// Only same-kind update pairs touching the same entity with the same
    /// field set coalesce; node updates also need the same property keys.
    pub fn merges_into(&self, last: &ChangeEntry) -> bool {
        match (last, self) {
            (ChangeEntry::SaveChanges, ChangeEntry::SaveChanges) => true,
            (ChangeEntry::MetadataUpdate { patch: a }, ChangeEntry::MetadataUpdate { patch: b }) => {
                a.field_set() == b.field_set()
            }
            (
                ChangeEntry::NodeUpdate { id: a, patch: pa },
                ChangeEntry::NodeUpdate { id: b, patch: pb },
            ) => a == b && pa.field_set() == pb.field_set() && pa.property_keys() == pb.property_keys(),
            (
                ChangeEntry::LayerUpdate { id: a, patch: pa },
                ChangeEntry::LayerUpdate { id: b, patch: pb },
            ) => a == b && pa.field_set() == pb.field_set(),
            (
                ChangeEntry::MusicKeyUpdate { id: a, patch: pa },
                ChangeEntry::MusicKeyUpdate { id: b, patch: pb },
            ) => a == b && pa.field_set() == pb.field_set(),
            _ => false,
        }
    }
}

impl Validate for ChangeEntry {
    fn validate(&self) -> SchemaResult {
        match self {
            ChangeEntry::SaveChanges
            | ChangeEntry::NodeRemove { .. }
            | ChangeEntry::EdgeRemove { .. }
            | ChangeEntry::LayerRemove { .. }
            | ChangeEntry::MusicKeyRemove { .. } => Ok(()),
            ChangeEntry::MetadataUpdate { patch } => patch.validate(),
            ChangeEntry::NodeAdd { node } => node.validate(),
            ChangeEntry::NodeUpdate { patch, .. } => patch.validate(),
            ChangeEntry::EdgeAdd { edge } => edge.validate(),
            ChangeEntry::LayerAdd { layer } => layer.validate(),
            ChangeEntry::LayerUpdate { patch, .. } => patch.validate(),
            ChangeEntry::MusicKeyAdd { key } => key.validate(),
            ChangeEntry::MusicKeyUpdate { patch, .. } => patch.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Position;

    fn moved(id: u64, x: f64) -> ChangeEntry {
        ChangeEntry::NodeUpdate {
            id: NodeId::new(id),
            patch: NodePatch::position(Position::new(x, 0.0)),
        }
    }

    #[test]
    fn repeated_drags_merge() {
        assert!(moved(1, 2.0).merges_into(&moved(1, 1.0)));
    }

    #[test]
    fn different_nodes_do_not_merge() {
        assert!(!moved(2, 2.0).merges_into(&moved(1, 1.0)));
    }

    #[test]
    fn different_property_keys_do_not_merge() {
        let a = ChangeEntry::NodeUpdate { id: NodeId::new(1), patch: NodePatch::property("wet", 0.1) };
        let b = ChangeEntry::NodeUpdate { id: NodeId::new(1), patch: NodePatch::property("decay", 2.0) };
        let c = ChangeEntry::NodeUpdate { id: NodeId::new(1), patch: NodePatch::property("wet", 0.4) };
        assert!(!b.merges_into(&a));
        assert!(c.merges_into(&a));
    }

    #[test]
    fn different_field_sets_do_not_merge() {
        let label = ChangeEntry::NodeUpdate { id: NodeId::new(1), patch: NodePatch::label("lead") };
        assert!(!label.merges_into(&moved(1, 1.0)));
    }

    #[test]
    fn save_markers_merge_and_block_others() {
        assert!(ChangeEntry::SaveChanges.merges_into(&ChangeEntry::SaveChanges));
        assert!(!moved(1, 1.0).merges_into(&ChangeEntry::SaveChanges));
    }

    #[test]
    fn adds_never_merge() {
        let layer = |id| ChangeEntry::LayerAdd {
            layer: MusicLayer { id: LayerId::new(id), name: "Layer".into() },
        };
        assert!(!layer(2).merges_into(&layer(1)));
    }

    #[test]
    fn wire_shape_is_tagged_by_type() {
        let json = serde_json::to_value(ChangeEntry::EdgeRemove { id: EdgeId::new(7) }).unwrap();
        assert_eq!(json["type"], "edge-remove");
        assert_eq!(json["id"], 7);

        let parsed: ChangeEntry =
            serde_json::from_str(r#"{"type":"music-key-remove","id":3}"#).unwrap();
        assert_eq!(parsed, ChangeEntry::MusicKeyRemove { id: KeyId::new(3) });
    }
}
