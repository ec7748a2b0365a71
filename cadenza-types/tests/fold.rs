use std::collections::BTreeMap;

use cadenza_types::reduce::apply_change_to_summary;
use cadenza_types::summary::EdgePending;
use cadenza_types::{
    AudioEdge, AudioNode, ChangeEntry, ChangeSummary, EdgeId, KeyId, KeyPatch, LayerId,
    MetadataPatch, MusicKey, NodeId, NodePatch, NodeType, Pending, Position, SocketRef,
};

fn fold(changes: &[ChangeEntry]) -> ChangeSummary {
    let mut summary = ChangeSummary::new();
    for change in changes {
        apply_change_to_summary(change, &mut summary);
    }
    summary
}

fn synth(id: u64) -> AudioNode {
    AudioNode::new(NodeId::new(id), NodeType::Synth, Position::new(0.0, 0.0))
}

#[test]
fn editing_session_folds_to_net_operations() {
    let edge = AudioEdge {
        id: EdgeId::new(3),
        source: SocketRef::new(NodeId::new(1), 0),
        target: SocketRef::new(NodeId::new(2), 0),
    };
    let summary = fold(&[
        ChangeEntry::NodeAdd { node: synth(1) },
        ChangeEntry::NodeUpdate { id: NodeId::new(1), patch: NodePatch::property("attack", 0.5) },
        ChangeEntry::NodeUpdate { id: NodeId::new(1), patch: NodePatch::property("release", 3.0) },
        ChangeEntry::NodeUpdate { id: NodeId::new(2), patch: NodePatch::label("Out") },
        ChangeEntry::NodeUpdate { id: NodeId::new(2), patch: NodePatch::position(Position::new(5.0, 5.0)) },
        ChangeEntry::EdgeAdd { edge },
        ChangeEntry::EdgeRemove { id: edge.id },
        ChangeEntry::MetadataUpdate { patch: MetadataPatch { name: Some("A".into()), ..Default::default() } },
        ChangeEntry::MetadataUpdate { patch: MetadataPatch { bpm: Some(90.0), ..Default::default() } },
        ChangeEntry::SaveChanges,
    ]);

    // the create absorbed both property updates
    match &summary.nodes[&NodeId::new(1)] {
        Pending::Create(node) => {
            let expected: BTreeMap<String, f64> =
                [("attack".to_string(), 0.5), ("release".to_string(), 3.0)].into_iter().collect();
            assert_eq!(node.properties, expected);
        }
        other => panic!("expected create, got {:?}", other),
    }
    // two partial updates merged field by field
    match &summary.nodes[&NodeId::new(2)] {
        Pending::Update(patch) => {
            assert_eq!(patch.label.as_deref(), Some("Out"));
            assert_eq!(patch.position, Some(Position::new(5.0, 5.0)));
        }
        other => panic!("expected update, got {:?}", other),
    }
    assert_eq!(summary.edges[&edge.id], EdgePending::Remove);
    let metadata = summary.metadata.as_ref().unwrap();
    assert_eq!(metadata.name.as_deref(), Some("A"));
    assert_eq!(metadata.bpm, Some(90.0));
    assert_eq!(summary.entity_count(), 4);
}

#[test]
fn remove_wins_over_everything_before_it() {
    let key = MusicKey {
        id: KeyId::new(9),
        layer_id: LayerId::new(1),
        instrument_id: NodeId::new(1),
        note: 60,
        time: 0.0,
        duration: 1.0,
        velocity: 0.5,
    };
    let summary = fold(&[
        ChangeEntry::MusicKeyAdd { key: key.clone() },
        ChangeEntry::MusicKeyUpdate { id: key.id, patch: KeyPatch { note: Some(62), ..Default::default() } },
        ChangeEntry::MusicKeyRemove { id: key.id },
    ]);
    assert_eq!(summary.keys[&key.id], Pending::Remove);
}

#[test]
fn absorb_puts_older_snapshot_underneath() {
    let older = fold(&[
        ChangeEntry::NodeAdd { node: synth(1) },
        ChangeEntry::NodeUpdate { id: NodeId::new(2), patch: NodePatch::label("Old") },
    ]);
    let newer = fold(&[
        ChangeEntry::NodeUpdate { id: NodeId::new(1), patch: NodePatch::position(Position::new(7.0, 7.0)) },
        ChangeEntry::NodeRemove { id: NodeId::new(2) },
    ]);

    let mut restored = older;
    restored.absorb(newer);

    match &restored.nodes[&NodeId::new(1)] {
        Pending::Create(node) => assert_eq!(node.position, Position::new(7.0, 7.0)),
        other => panic!("expected create, got {:?}", other),
    }
    assert_eq!(restored.nodes[&NodeId::new(2)], Pending::Remove);
}

#[test]
fn change_entries_are_tagged_by_type() {
    let entry = ChangeEntry::NodeRemove { id: NodeId::new(4) };
    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(json["type"], "node-remove");
    assert_eq!(json["id"], 4);

    let back: ChangeEntry = serde_json::from_value(json).unwrap();
    assert_eq!(back, entry);
    assert_eq!(
        serde_json::to_value(ChangeEntry::SaveChanges).unwrap(),
        serde_json::json!({ "type": "save-changes" })
    );
}
