use std::sync::Arc;
use std::time::Duration;

use cadenza_audio::{AudioMirror, Destination, NullBackend};
use cadenza_core::config::Config;
use cadenza_core::persistence::SqlitePersistence;
use cadenza_core::session::EditSession;
use cadenza_core::state::CompositionStore;
use cadenza_types::{CompositionMeta, KeyDraft, MetadataPatch, NodeType, Position, SocketRef};

fn open_session(persistence: &Arc<SqlitePersistence>, id: cadenza_types::CompositionId) -> EditSession {
    let snapshot = persistence.load_snapshot(id).unwrap();
    let (store, dropped) = CompositionStore::from_snapshot(id, snapshot);
    assert_eq!(dropped, 0);
    let mirror = AudioMirror::new(Box::new(NullBackend), Destination::platform());
    EditSession::new(store, &Config::embedded(), persistence.clone(), mirror)
}

#[test]
fn edits_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let persistence = Arc::new(SqlitePersistence::open(dir.path().join("cadenza.sqlite")).unwrap());
    let id = persistence.create_composition(&CompositionMeta::default()).unwrap();

    let mut session = open_session(&persistence, id);
    let synth = session.create_node(NodeType::Synth, Position::new(10.0, 20.0)).unwrap();
    let out = session.create_node(NodeType::Output, Position::new(200.0, 20.0)).unwrap();
    session.connect(SocketRef::new(synth, 0), SocketRef::new(out, 0)).unwrap();
    session.set_node_property(synth, "attack", 0.2);
    let layer = session.create_layer("Melody").unwrap();
    session
        .create_key(layer, synth, KeyDraft { time: 0.0, note: 60, duration: 4.0 })
        .unwrap();
    session.update_metadata(MetadataPatch { name: Some("Etude".into()), bpm: Some(96.0), ..Default::default() });

    // created and removed before any flush: persisted as a bare remove
    let scratch = session.create_node(NodeType::Reverb, Position::default()).unwrap();
    session.remove_node(scratch);

    assert!(session.close(Duration::from_secs(5)));
    let expected = session.store().to_snapshot();

    let reopened = open_session(&persistence, id);
    assert_eq!(reopened.store().to_snapshot(), expected);
    assert_eq!(reopened.store().meta().name, "Etude");
    assert_eq!(reopened.store().property_value(synth, "attack"), Some(0.2));
    assert!(reopened.store().node(scratch).is_none());
}

#[test]
fn second_session_continues_the_id_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let persistence = Arc::new(SqlitePersistence::open(dir.path().join("cadenza.sqlite")).unwrap());
    let id = persistence.create_composition(&CompositionMeta::default()).unwrap();

    let mut first = open_session(&persistence, id);
    let a = first.create_node(NodeType::Synth, Position::default()).unwrap();
    assert!(first.close(Duration::from_secs(5)));

    let mut second = open_session(&persistence, id);
    let b = second.create_node(NodeType::Gain, Position::default()).unwrap();
    assert_ne!(a, b);
    second.remove_node(a);
    assert!(second.close(Duration::from_secs(5)));

    let snapshot = persistence.load_snapshot(id).unwrap().into_loaded();
    assert_eq!(snapshot.nodes.len(), 1);
    assert!(snapshot.nodes.contains_key(&b));
}
