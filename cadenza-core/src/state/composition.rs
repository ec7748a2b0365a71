use std::collections::BTreeMap;

use cadenza_types::schema::{
    validate_label, validate_layer_name, validate_position, validate_property, validate_sockets,
};
use cadenza_types::{
    AudioEdge, AudioNode, CompositionId, CompositionMeta, CompositionSnapshot, EdgeId, KeyDraft,
    KeyId, KeyPatch, LayerId, LoadedComposition, MetadataPatch, MusicKey, MusicLayer, NodeId,
    NodeType, Position, SocketRef, Validate,
};

/// A removed node together with the edges its removal cascaded to.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedNode {
    pub node: AudioNode,
    pub edges: Vec<AudioEdge>,
}

/// A removed layer together with the keys its removal cascaded to.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedLayer {
    pub layer: MusicLayer,
    pub keys: Vec<MusicKey>,
}

/// The in-memory composition: single source of truth for the graph and the
/// timeline during an edit session.
///
/// Every mutator validates its input and reports failure through its return
/// value (`None`/`false`), leaving the store untouched. Callers emit a change
/// entry only on success.
#[derive(Debug, Clone)]
pub struct CompositionStore {
    id: CompositionId,
    meta: CompositionMeta,
    nodes: BTreeMap<NodeId, AudioNode>,
    edges: BTreeMap<EdgeId, AudioEdge>,
    layers: BTreeMap<LayerId, MusicLayer>,
    keys: BTreeMap<KeyId, MusicKey>,
    next_id: u64,
}

fn reject(op: &str, reason: impl std::fmt::Display) {
    log::debug!(target: "core::store", "{} rejected: {}", op, reason);
}

impl CompositionStore {
    pub fn new(id: CompositionId, meta: CompositionMeta) -> Self {
        Self {
            id,
            meta,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            layers: BTreeMap::new(),
            keys: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Build a store from validated load results.
    pub fn from_loaded(id: CompositionId, loaded: LoadedComposition) -> Self {
        let max_id = loaded
            .nodes
            .keys()
            .map(|id| id.get())
            .chain(loaded.edges.keys().map(|id| id.get()))
            .chain(loaded.layers.keys().map(|id| id.get()))
            .chain(loaded.keys.keys().map(|id| id.get()))
            .max()
            .unwrap_or(0);
        Self {
            id,
            meta: loaded.meta,
            nodes: loaded.nodes,
            edges: loaded.edges,
            layers: loaded.layers,
            keys: loaded.keys,
            next_id: max_id + 1,
        }
    }

    /// Validate a snapshot and build a store from what survives. Returns the
    /// store and the number of dropped entries.
    pub fn from_snapshot(id: CompositionId, snapshot: CompositionSnapshot) -> (Self, usize) {
        let loaded = snapshot.into_loaded();
        let dropped = loaded.dropped;
        if dropped > 0 {
            log::warn!(target: "core::store", "composition {}: dropped {} invalid entries", id, dropped);
        }
        (Self::from_loaded(id, loaded), dropped)
    }

    pub fn to_snapshot(&self) -> CompositionSnapshot {
        LoadedComposition {
            meta: self.meta.clone(),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            layers: self.layers.clone(),
            keys: self.keys.clone(),
            dropped: 0,
        }
        .to_snapshot()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn reserve_id(&mut self, id: u64) {
        if id >= self.next_id {
            self.next_id = id + 1;
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn id(&self) -> CompositionId {
        self.id
    }

    pub fn meta(&self) -> &CompositionMeta {
        &self.meta
    }

    pub fn node(&self, id: NodeId) -> Option<&AudioNode> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &AudioNode> {
        self.nodes.values()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&AudioEdge> {
        self.edges.get(&id)
    }

    pub fn edges(&self) -> impl Iterator<Item = &AudioEdge> {
        self.edges.values()
    }

    pub fn edges_touching(&self, node_id: NodeId) -> impl Iterator<Item = &AudioEdge> {
        self.edges.values().filter(move |e| e.touches(node_id))
    }

    pub fn layer(&self, id: LayerId) -> Option<&MusicLayer> {
        self.layers.get(&id)
    }

    pub fn layers(&self) -> impl Iterator<Item = &MusicLayer> {
        self.layers.values()
    }

    pub fn key(&self, id: KeyId) -> Option<&MusicKey> {
        self.keys.get(&id)
    }

    pub fn keys(&self) -> impl Iterator<Item = &MusicKey> {
        self.keys.values()
    }

    pub fn keys_in_layer(&self, layer_id: LayerId) -> impl Iterator<Item = &MusicKey> {
        self.keys.values().filter(move |k| k.layer_id == layer_id)
    }

    /// Effective property value: the stored override or the catalog default.
    pub fn property_value(&self, node_id: NodeId, key: &str) -> Option<f64> {
        self.nodes.get(&node_id)?.property(key)
    }

    fn is_instrument(&self, node_id: NodeId) -> bool {
        self.nodes.get(&node_id).is_some_and(|n| n.node_type.is_instrument())
    }

    // ── Metadata ────────────────────────────────────────────────────

    pub fn update_metadata(&mut self, patch: &MetadataPatch) -> bool {
        if let Err(e) = patch.validate() {
            reject("update_metadata", e);
            return false;
        }
        self.meta.apply(patch);
        true
    }

    // ── Nodes ───────────────────────────────────────────────────────

    pub fn create_node(&mut self, node_type: NodeType, position: Position) -> Option<AudioNode> {
        if let Err(e) = validate_position(&position) {
            reject("create_node", e);
            return None;
        }
        let id = NodeId::new(self.allocate_id());
        let node = AudioNode::new(id, node_type, position);
        self.nodes.insert(id, node.clone());
        Some(node)
    }

    /// Insert a fully-formed node. Fails on an id that is already taken.
    pub fn insert_node(&mut self, node: AudioNode) -> bool {
        if self.nodes.contains_key(&node.id) {
            reject("insert_node", format!("node {} already exists", node.id));
            return false;
        }
        if let Err(e) = node.validate() {
            reject("insert_node", e);
            return false;
        }
        self.reserve_id(node.id.get());
        self.nodes.insert(node.id, node);
        true
    }

    pub fn move_node(&mut self, id: NodeId, position: Position) -> bool {
        if let Err(e) = validate_position(&position) {
            reject("move_node", e);
            return false;
        }
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.position = position;
                true
            }
            None => false,
        }
    }

    pub fn rename_node(&mut self, id: NodeId, label: &str) -> bool {
        if let Err(e) = validate_label(label) {
            reject("rename_node", e);
            return false;
        }
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.label = label.to_string();
                true
            }
            None => false,
        }
    }

    pub fn set_node_property(&mut self, id: NodeId, key: &str, value: f64) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        if let Err(e) = validate_property(node.node_type, key, value) {
            reject("set_node_property", e);
            return false;
        }
        node.properties.insert(key.to_string(), value);
        true
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<RemovedNode> {
        let node = self.nodes.remove(&id)?;
        let edge_ids: Vec<EdgeId> = self.edges_touching(id).map(|e| e.id).collect();
        let edges = edge_ids.iter().filter_map(|eid| self.edges.remove(eid)).collect();
        Some(RemovedNode { node, edges })
    }

    // ── Edges ───────────────────────────────────────────────────────

    /// Connect an output socket to an input socket.
    ///
    /// Rejects missing endpoints, self-loops, socket indices outside the
    /// node types' declared counts, and exact duplicates of an existing edge.
    /// A target socket may receive several edges.
    pub fn connect(&mut self, source: SocketRef, target: SocketRef) -> Option<AudioEdge> {
        let (Some(source_node), Some(target_node)) =
            (self.nodes.get(&source.node_id), self.nodes.get(&target.node_id))
        else {
            reject("connect", "endpoint node missing");
            return None;
        };
        let candidate = AudioEdge { id: EdgeId::new(0), source, target };
        if let Err(e) = candidate
            .validate()
            .and_then(|()| validate_sockets(&candidate, source_node.node_type, target_node.node_type))
        {
            reject("connect", e);
            return None;
        }
        if self.edges.values().any(|e| e.source == source && e.target == target) {
            reject("connect", "duplicate edge");
            return None;
        }
        let edge = AudioEdge { id: EdgeId::new(self.allocate_id()), ..candidate };
        self.edges.insert(edge.id, edge);
        Some(edge)
    }

    pub fn disconnect(&mut self, id: EdgeId) -> bool {
        self.edges.remove(&id).is_some()
    }

    // ── Layers ──────────────────────────────────────────────────────

    pub fn create_layer(&mut self, name: &str) -> Option<MusicLayer> {
        if let Err(e) = validate_layer_name(name) {
            reject("create_layer", e);
            return None;
        }
        let layer = MusicLayer {
            id: LayerId::new(self.allocate_id()),
            name: name.to_string(),
        };
        self.layers.insert(layer.id, layer.clone());
        Some(layer)
    }

    pub fn rename_layer(&mut self, id: LayerId, name: &str) -> bool {
        if let Err(e) = validate_layer_name(name) {
            reject("rename_layer", e);
            return false;
        }
        match self.layers.get_mut(&id) {
            Some(layer) => {
                layer.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Remove a layer and its keys. The last remaining layer cannot be removed.
    pub fn remove_layer(&mut self, id: LayerId) -> Option<RemovedLayer> {
        if !self.layers.contains_key(&id) {
            return None;
        }
        if self.layers.len() == 1 {
            reject("remove_layer", "a composition keeps at least one layer");
            return None;
        }
        let layer = self.layers.remove(&id)?;
        let key_ids: Vec<KeyId> = self.keys_in_layer(id).map(|k| k.id).collect();
        let keys = key_ids.iter().filter_map(|kid| self.keys.remove(kid)).collect();
        Some(RemovedLayer { layer, keys })
    }

    // ── Keys ────────────────────────────────────────────────────────

    /// Place a key on a layer, sounded by an instrument node.
    pub fn create_key(
        &mut self,
        layer_id: LayerId,
        instrument_id: NodeId,
        draft: KeyDraft,
        velocity: f64,
    ) -> Option<MusicKey> {
        if !self.layers.contains_key(&layer_id) {
            reject("create_key", format!("layer {} missing", layer_id));
            return None;
        }
        if !self.is_instrument(instrument_id) {
            reject("create_key", format!("node {} is not an instrument", instrument_id));
            return None;
        }
        let mut key = MusicKey {
            id: KeyId::new(0),
            layer_id,
            instrument_id,
            note: draft.note,
            time: draft.time,
            duration: draft.duration,
            velocity,
        };
        if let Err(e) = key.validate() {
            reject("create_key", e);
            return None;
        }
        key.id = KeyId::new(self.allocate_id());
        self.keys.insert(key.id, key.clone());
        Some(key)
    }

    /// Move, resize, transpose or re-route a key.
    pub fn update_key(&mut self, id: KeyId, patch: &KeyPatch) -> bool {
        if !self.keys.contains_key(&id) {
            return false;
        }
        if let Err(e) = patch.validate() {
            reject("update_key", e);
            return false;
        }
        if let Some(layer_id) = patch.layer_id {
            if !self.layers.contains_key(&layer_id) {
                reject("update_key", format!("layer {} missing", layer_id));
                return false;
            }
        }
        if let Some(instrument_id) = patch.instrument_id {
            if !self.is_instrument(instrument_id) {
                reject("update_key", format!("node {} is not an instrument", instrument_id));
                return false;
            }
        }
        match self.keys.get_mut(&id) {
            Some(key) => {
                key.apply(patch);
                true
            }
            None => false,
        }
    }

    pub fn remove_key(&mut self, id: KeyId) -> Option<MusicKey> {
        self.keys.remove(&id)
    }

    /// Route several keys to one instrument. All-or-nothing: fails without
    /// changes if any key is missing or the target is not an instrument.
    pub fn set_key_instrument(&mut self, key_ids: &[KeyId], instrument_id: NodeId) -> bool {
        if key_ids.is_empty() {
            return false;
        }
        if !self.is_instrument(instrument_id) {
            reject("set_key_instrument", format!("node {} is not an instrument", instrument_id));
            return false;
        }
        if let Some(missing) = key_ids.iter().find(|id| !self.keys.contains_key(id)) {
            reject("set_key_instrument", format!("key {} missing", missing));
            return false;
        }
        for id in key_ids {
            if let Some(key) = self.keys.get_mut(id) {
                key.instrument_id = instrument_id;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CompositionStore {
        CompositionStore::new(CompositionId::new(1), CompositionMeta::default())
    }

    fn draft() -> KeyDraft {
        KeyDraft { time: 0.0, note: 40, duration: 4.0 }
    }

    #[test]
    fn created_node_reports_defaults() {
        let mut s = store();
        let node = s.create_node(NodeType::Compressor, Position::new(10.0, 20.0)).unwrap();
        for prop in NodeType::Compressor.spec().properties {
            assert_eq!(s.property_value(node.id, prop.name), Some(prop.default));
        }
        assert!(s.set_node_property(node.id, "ratio", 4.0));
        assert_eq!(s.property_value(node.id, "ratio"), Some(4.0));
        assert_eq!(s.property_value(node.id, "knee"), Some(30.0));
        assert_eq!(s.node(node.id).unwrap().properties.len(), 1);
    }

    #[test]
    fn property_out_of_range_is_rejected() {
        let mut s = store();
        let node = s.create_node(NodeType::Gain, Position::default()).unwrap();
        assert!(!s.set_node_property(node.id, "gain", 300.0));
        assert!(!s.set_node_property(node.id, "gain", f64::NAN));
        assert!(!s.set_node_property(node.id, "wet", 0.5));
        assert!(!s.set_node_property(NodeId::new(999), "gain", 1.0));
        assert!(s.node(node.id).unwrap().properties.is_empty());
    }

    #[test]
    fn duplicate_insert_fails() {
        let mut s = store();
        let node = s.create_node(NodeType::Synth, Position::default()).unwrap();
        let mut clash = AudioNode::new(node.id, NodeType::Reverb, Position::default());
        clash.label = "Impostor".into();
        assert!(!s.insert_node(clash));
        assert_eq!(s.node(node.id).unwrap().node_type, NodeType::Synth);
    }

    #[test]
    fn inserted_ids_are_not_reused() {
        let mut s = store();
        assert!(s.insert_node(AudioNode::new(NodeId::new(50), NodeType::Gain, Position::default())));
        let next = s.create_node(NodeType::Gain, Position::default()).unwrap();
        assert!(next.id.get() > 50);
    }

    #[test]
    fn non_finite_position_is_rejected() {
        let mut s = store();
        assert!(s.create_node(NodeType::Gain, Position::new(f64::NAN, 0.0)).is_none());
        let node = s.create_node(NodeType::Gain, Position::default()).unwrap();
        assert!(!s.move_node(node.id, Position::new(0.0, f64::INFINITY)));
        assert!(s.move_node(node.id, Position::new(5.0, 5.0)));
    }

    #[test]
    fn remove_node_cascades_edges() {
        let mut s = store();
        let synth = s.create_node(NodeType::Synth, Position::default()).unwrap();
        let reverb = s.create_node(NodeType::Reverb, Position::default()).unwrap();
        let out = s.create_node(NodeType::Output, Position::default()).unwrap();
        s.connect(SocketRef::new(synth.id, 0), SocketRef::new(reverb.id, 0)).unwrap();
        let kept = s.connect(SocketRef::new(synth.id, 0), SocketRef::new(out.id, 0)).unwrap();
        s.connect(SocketRef::new(reverb.id, 0), SocketRef::new(out.id, 0)).unwrap();

        let removed = s.remove_node(reverb.id).unwrap();
        assert_eq!(removed.edges.len(), 2);
        assert_eq!(s.edges_touching(reverb.id).count(), 0);
        assert_eq!(s.edges().count(), 1);
        assert!(s.edge(kept.id).is_some());
        assert!(s.remove_node(reverb.id).is_none());
    }

    #[test]
    fn connect_checks_sockets_and_duplicates() {
        let mut s = store();
        let synth = s.create_node(NodeType::Synth, Position::default()).unwrap();
        let gain = s.create_node(NodeType::Gain, Position::default()).unwrap();
        let out = s.create_node(NodeType::Output, Position::default()).unwrap();

        assert!(s.connect(SocketRef::new(synth.id, 1), SocketRef::new(out.id, 0)).is_none());
        assert!(s.connect(SocketRef::new(synth.id, 0), SocketRef::new(out.id, 1)).is_none());
        assert!(s.connect(SocketRef::new(out.id, 0), SocketRef::new(gain.id, 0)).is_none());
        assert!(s.connect(SocketRef::new(gain.id, 0), SocketRef::new(gain.id, 0)).is_none());
        assert!(s.connect(SocketRef::new(synth.id, 0), SocketRef::new(NodeId::new(99), 0)).is_none());
        assert_eq!(s.edges().count(), 0);

        assert!(s.connect(SocketRef::new(synth.id, 0), SocketRef::new(out.id, 0)).is_some());
        assert!(s.connect(SocketRef::new(synth.id, 0), SocketRef::new(out.id, 0)).is_none());
        // a second source into the same input socket is allowed
        assert!(s.connect(SocketRef::new(gain.id, 0), SocketRef::new(out.id, 0)).is_some());
        assert_eq!(s.edges().count(), 2);
    }

    #[test]
    fn last_layer_cannot_be_removed() {
        let mut s = store();
        let only = s.create_layer("Melody").unwrap();
        assert!(s.remove_layer(only.id).is_none());
        assert!(s.layer(only.id).is_some());
    }

    #[test]
    fn remove_layer_cascades_keys() {
        let mut s = store();
        let synth = s.create_node(NodeType::Synth, Position::default()).unwrap();
        let a = s.create_layer("A").unwrap();
        let b = s.create_layer("B").unwrap();
        s.create_key(a.id, synth.id, draft(), 0.8).unwrap();
        s.create_key(a.id, synth.id, draft(), 0.8).unwrap();
        let survivor = s.create_key(b.id, synth.id, draft(), 0.8).unwrap();

        let removed = s.remove_layer(a.id).unwrap();
        assert_eq!(removed.keys.len(), 2);
        assert_eq!(s.keys().count(), 1);
        assert!(s.key(survivor.id).is_some());
    }

    #[test]
    fn create_key_requires_layer_and_instrument() {
        let mut s = store();
        let synth = s.create_node(NodeType::Synth, Position::default()).unwrap();
        let reverb = s.create_node(NodeType::Reverb, Position::default()).unwrap();
        let layer = s.create_layer("A").unwrap();

        assert!(s.create_key(LayerId::new(999), synth.id, draft(), 0.8).is_none());
        assert!(s.create_key(layer.id, reverb.id, draft(), 0.8).is_none());
        assert!(s.create_key(layer.id, synth.id, KeyDraft { duration: 0.0, ..draft() }, 0.8).is_none());
        assert!(s.create_key(layer.id, synth.id, draft(), 1.5).is_none());
        assert!(s.create_key(layer.id, synth.id, draft(), 0.8).is_some());
    }

    #[test]
    fn key_survives_instrument_removal() {
        let mut s = store();
        let synth = s.create_node(NodeType::Synth, Position::default()).unwrap();
        let layer = s.create_layer("A").unwrap();
        let key = s.create_key(layer.id, synth.id, draft(), 0.8).unwrap();
        s.remove_node(synth.id);
        assert_eq!(s.key(key.id).unwrap().instrument_id, synth.id);
    }

    #[test]
    fn set_key_instrument_is_all_or_nothing() {
        let mut s = store();
        let a = s.create_node(NodeType::Synth, Position::default()).unwrap();
        let b = s.create_node(NodeType::Synth, Position::default()).unwrap();
        let layer = s.create_layer("A").unwrap();
        let k1 = s.create_key(layer.id, a.id, draft(), 0.8).unwrap();
        let k2 = s.create_key(layer.id, a.id, draft(), 0.8).unwrap();

        assert!(!s.set_key_instrument(&[k1.id, KeyId::new(999)], b.id));
        assert_eq!(s.key(k1.id).unwrap().instrument_id, a.id);

        assert!(s.set_key_instrument(&[k1.id, k2.id], b.id));
        assert!(s.keys().all(|k| k.instrument_id == b.id));
    }

    #[test]
    fn update_key_validates_fields() {
        let mut s = store();
        let synth = s.create_node(NodeType::Synth, Position::default()).unwrap();
        let layer = s.create_layer("A").unwrap();
        let key = s.create_key(layer.id, synth.id, draft(), 0.8).unwrap();

        assert!(!s.update_key(key.id, &KeyPatch { note: Some(200), ..Default::default() }));
        assert!(!s.update_key(key.id, &KeyPatch { layer_id: Some(LayerId::new(999)), ..Default::default() }));
        assert!(s.update_key(key.id, &KeyPatch { time: Some(16.0), note: Some(45), ..Default::default() }));
        let key = s.key(key.id).unwrap();
        assert_eq!((key.time, key.note), (16.0, 45));
    }

    #[test]
    fn snapshot_round_trip() {
        let mut s = store();
        let synth = s.create_node(NodeType::Synth, Position::new(1.0, 2.0)).unwrap();
        let out = s.create_node(NodeType::Output, Position::default()).unwrap();
        s.connect(SocketRef::new(synth.id, 0), SocketRef::new(out.id, 0)).unwrap();
        let layer = s.create_layer("A").unwrap();
        s.create_key(layer.id, synth.id, draft(), 0.8).unwrap();
        s.set_node_property(synth.id, "detune", 12.0);

        let (again, dropped) = CompositionStore::from_snapshot(s.id(), s.to_snapshot());
        assert_eq!(dropped, 0);
        assert_eq!(again.nodes().count(), 2);
        assert_eq!(again.edges().count(), 1);
        assert_eq!(again.keys().count(), 1);
        assert_eq!(again.property_value(synth.id, "detune"), Some(12.0));
        assert_eq!(again.meta(), s.meta());
    }
}
