//! Pure reducers folding change entries into a `ChangeSummary`.
//!
//! These functions are the single source of truth for change → summary
//! transitions. They do NOT touch the model store, the change log or the
//! audio mirror, and they never fail: invalid transitions are logged and
//! resolved in favour of the newer operation.

mod pending;

use pending::{fold_create, fold_pending, fold_remove, fold_update};

use crate::summary::EdgePending;
use crate::{ChangeEntry, ChangeSummary};

/// Fold one change entry into the summary.
pub fn apply_change_to_summary(change: &ChangeEntry, summary: &mut ChangeSummary) {
    match change {
        // The save marker is log bookkeeping only.
        ChangeEntry::SaveChanges => {}

        ChangeEntry::MetadataUpdate { patch } => {
            summary.metadata.get_or_insert_with(Default::default).merge(patch);
        }

        ChangeEntry::NodeAdd { node } => fold_create(&mut summary.nodes, "node", node.id, node.clone()),
        ChangeEntry::NodeUpdate { id, patch } => fold_update(&mut summary.nodes, "node", *id, patch),
        ChangeEntry::NodeRemove { id } => fold_remove(&mut summary.nodes, *id),

        ChangeEntry::EdgeAdd { edge } => {
            summary.edges.insert(edge.id, EdgePending::Create(*edge));
        }
        ChangeEntry::EdgeRemove { id } => {
            summary.edges.insert(*id, EdgePending::Remove);
        }

        ChangeEntry::LayerAdd { layer } => fold_create(&mut summary.layers, "layer", layer.id, layer.clone()),
        ChangeEntry::LayerUpdate { id, patch } => fold_update(&mut summary.layers, "layer", *id, patch),
        ChangeEntry::LayerRemove { id } => fold_remove(&mut summary.layers, *id),

        ChangeEntry::MusicKeyAdd { key } => fold_create(&mut summary.keys, "key", key.id, key.clone()),
        ChangeEntry::MusicKeyUpdate { id, patch } => fold_update(&mut summary.keys, "key", *id, patch),
        ChangeEntry::MusicKeyRemove { id } => fold_remove(&mut summary.keys, *id),
    }
}

impl ChangeSummary {
    /// Re-apply `newer` on top of `self` with the same rules as folding
    /// individual entries. Used to put a failed flush's snapshot back
    /// underneath edits made while it was in flight.
    pub fn absorb(&mut self, newer: ChangeSummary) {
        if let Some(patch) = newer.metadata {
            self.metadata.get_or_insert_with(Default::default).merge(&patch);
        }
        for (id, pending) in newer.nodes {
            fold_pending(&mut self.nodes, "node", id, pending);
        }
        for (id, pending) in newer.edges {
            self.edges.insert(id, pending);
        }
        for (id, pending) in newer.layers {
            fold_pending(&mut self.layers, "layer", id, pending);
        }
        for (id, pending) in newer.keys {
            fold_pending(&mut self.keys, "key", id, pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AudioEdge, AudioNode, EdgeId, KeyId, KeyPatch, LayerId, MetadataPatch, MusicKey, NodeId,
        NodePatch, NodeType, Pending, Position, SocketRef,
    };

    fn node(id: u64) -> AudioNode {
        AudioNode::new(NodeId::new(id), NodeType::Synth, Position::default())
    }

    fn fold(changes: &[ChangeEntry]) -> ChangeSummary {
        let mut summary = ChangeSummary::new();
        for c in changes {
            apply_change_to_summary(c, &mut summary);
        }
        summary
    }

    #[test]
    fn create_then_update_stays_create_with_merged_fields() {
        let summary = fold(&[
            ChangeEntry::NodeAdd { node: node(1) },
            ChangeEntry::NodeUpdate { id: NodeId::new(1), patch: NodePatch::position(Position::new(3.0, 4.0)) },
            ChangeEntry::NodeUpdate { id: NodeId::new(1), patch: NodePatch::property("attack", 0.5) },
        ]);
        match &summary.nodes[&NodeId::new(1)] {
            Pending::Create(n) => {
                assert_eq!(n.position, Position::new(3.0, 4.0));
                assert_eq!(n.properties.get("attack"), Some(&0.5));
            }
            other => panic!("expected create, got {:?}", other),
        }
    }

    #[test]
    fn create_then_remove_collapses_to_remove() {
        let summary = fold(&[
            ChangeEntry::NodeAdd { node: node(1) },
            ChangeEntry::NodeRemove { id: NodeId::new(1) },
        ]);
        assert_eq!(summary.nodes[&NodeId::new(1)], Pending::Remove);
    }

    #[test]
    fn updates_merge_field_by_field() {
        let summary = fold(&[
            ChangeEntry::NodeUpdate { id: NodeId::new(1), patch: NodePatch::property("attack", 0.5) },
            ChangeEntry::NodeUpdate { id: NodeId::new(1), patch: NodePatch::property("decay", 0.2) },
            ChangeEntry::NodeUpdate { id: NodeId::new(1), patch: NodePatch::label("lead") },
        ]);
        match &summary.nodes[&NodeId::new(1)] {
            Pending::Update(p) => {
                let props = p.properties.as_ref().unwrap();
                assert_eq!(props.len(), 2);
                assert_eq!(p.label.as_deref(), Some("lead"));
                assert!(p.position.is_none());
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn update_after_remove_is_ignored() {
        let summary = fold(&[
            ChangeEntry::MusicKeyRemove { id: KeyId::new(9) },
            ChangeEntry::MusicKeyUpdate { id: KeyId::new(9), patch: KeyPatch { note: Some(3), ..Default::default() } },
        ]);
        assert_eq!(summary.keys[&KeyId::new(9)], Pending::Remove);
    }

    #[test]
    fn metadata_accumulates() {
        let summary = fold(&[
            ChangeEntry::MetadataUpdate { patch: MetadataPatch { name: Some("a".into()), ..Default::default() } },
            ChangeEntry::MetadataUpdate { patch: MetadataPatch { bpm: Some(90.0), ..Default::default() } },
            ChangeEntry::MetadataUpdate { patch: MetadataPatch { name: Some("b".into()), ..Default::default() } },
        ]);
        let meta = summary.metadata.unwrap();
        assert_eq!(meta.name.as_deref(), Some("b"));
        assert_eq!(meta.bpm, Some(90.0));
    }

    #[test]
    fn save_marker_leaves_summary_untouched() {
        assert!(fold(&[ChangeEntry::SaveChanges]).is_empty());
    }

    #[test]
    fn edges_create_and_remove() {
        let edge = AudioEdge {
            id: EdgeId::new(5),
            source: SocketRef::new(NodeId::new(1), 0),
            target: SocketRef::new(NodeId::new(2), 0),
        };
        let summary = fold(&[ChangeEntry::EdgeAdd { edge }, ChangeEntry::EdgeRemove { id: edge.id }]);
        assert_eq!(summary.edges[&edge.id], EdgePending::Remove);
    }

    #[test]
    fn absorb_puts_newer_changes_on_top() {
        let older = fold(&[
            ChangeEntry::NodeAdd { node: node(1) },
            ChangeEntry::NodeUpdate { id: NodeId::new(2), patch: NodePatch::property("attack", 0.5) },
            ChangeEntry::LayerAdd { layer: crate::MusicLayer { id: LayerId::new(1), name: "A".into() } },
        ]);
        let newer = fold(&[
            ChangeEntry::NodeUpdate { id: NodeId::new(1), patch: NodePatch::label("bass") },
            ChangeEntry::NodeUpdate { id: NodeId::new(2), patch: NodePatch::property("attack", 0.9) },
            ChangeEntry::LayerRemove { id: LayerId::new(1) },
        ]);

        let mut restored = older;
        restored.absorb(newer);

        match &restored.nodes[&NodeId::new(1)] {
            Pending::Create(n) => assert_eq!(n.label, "bass"),
            other => panic!("expected create, got {:?}", other),
        }
        match &restored.nodes[&NodeId::new(2)] {
            Pending::Update(p) => assert_eq!(p.properties.as_ref().unwrap()["attack"], 0.9),
            other => panic!("expected update, got {:?}", other),
        }
        assert!(restored.layers[&LayerId::new(1)].is_remove());
    }

    #[test]
    fn summary_serializes_operations() {
        let key = MusicKey {
            id: KeyId::new(1),
            layer_id: LayerId::new(1),
            instrument_id: NodeId::new(1),
            note: 10,
            time: 0.0,
            duration: 1.0,
            velocity: 0.5,
        };
        let summary = fold(&[
            ChangeEntry::MusicKeyAdd { key },
            ChangeEntry::NodeRemove { id: NodeId::new(4) },
        ]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["keys"]["1"]["operation"], "create");
        assert_eq!(json["keys"]["1"]["note"], 10);
        assert_eq!(json["nodes"]["4"]["operation"], "remove");
        assert!(json.get("edges").is_none());
    }
}
