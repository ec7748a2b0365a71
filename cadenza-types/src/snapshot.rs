//! Initial load contract.
//!
//! A session is bootstrapped from a snapshot shaped as
//! `{ name, description, nodes: {id: node}, edges, layers, keys }`. Entries
//! are kept as raw JSON until validation so a single malformed row (schema
//! drift between client and storage) is skipped instead of failing the load.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::{sanitize_properties, validate_sockets, Validate};
use crate::{
    AudioEdge, AudioNode, CompositionMeta, EdgeId, KeyId, LayerId, MusicKey, MusicLayer, NodeId,
    NodeType, Position, DEFAULT_BPM,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositionSnapshot {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    #[serde(default)]
    pub nodes: BTreeMap<String, Value>,
    #[serde(default)]
    pub edges: BTreeMap<String, Value>,
    #[serde(default)]
    pub layers: BTreeMap<String, Value>,
    #[serde(default)]
    pub keys: BTreeMap<String, Value>,
}

/// Validated contents of a snapshot.
#[derive(Debug, Clone, Default)]
pub struct LoadedComposition {
    pub meta: CompositionMeta,
    pub nodes: BTreeMap<NodeId, AudioNode>,
    pub edges: BTreeMap<EdgeId, AudioEdge>,
    pub layers: BTreeMap<LayerId, MusicLayer>,
    pub keys: BTreeMap<KeyId, MusicKey>,
    /// Number of entries skipped during validation.
    pub dropped: usize,
}

/// Node row as stored; properties stay loose so one bad value only costs
/// that property.
#[derive(Deserialize)]
struct RawNode {
    id: NodeId,
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    position: Position,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
}

fn parse_entry<T: DeserializeOwned>(kind: &str, key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!(target: "types::snapshot", "dropping {} '{}': {}", kind, key, e);
            None
        }
    }
}

fn check<T: Validate>(kind: &str, key: &str, entity: T) -> Option<T> {
    match entity.validate() {
        Ok(()) => Some(entity),
        Err(e) => {
            log::warn!(target: "types::snapshot", "dropping {} '{}': {}", kind, key, e);
            None
        }
    }
}

fn key_matches(kind: &str, key: &str, id: u64) -> bool {
    if key.parse::<u64>().ok() == Some(id) {
        true
    } else {
        log::warn!(target: "types::snapshot", "dropping {} '{}': record key does not match id {}", kind, key, id);
        false
    }
}

fn into_node(key: &str, raw: RawNode) -> Option<AudioNode> {
    if !key_matches("node", key, raw.id.get()) {
        return None;
    }
    let numeric: BTreeMap<String, f64> = raw
        .properties
        .into_iter()
        .filter_map(|(name, value)| match value.as_f64() {
            Some(v) => Some((name, v)),
            None => {
                log::warn!(target: "types::snapshot", "node '{}': dropping non-numeric property '{}'", key, name);
                None
            }
        })
        .collect();
    let node = AudioNode {
        id: raw.id,
        node_type: raw.node_type,
        label: raw.label.unwrap_or_else(|| raw.node_type.spec().label.to_string()),
        position: raw.position,
        properties: sanitize_properties(raw.node_type, numeric),
    };
    check("node", key, node)
}

impl CompositionSnapshot {
    /// Validate every entry, dropping the ones that fail individually.
    /// Edges must reference existing nodes with in-range sockets; keys must
    /// reference an existing layer (their instrument may dangle).
    pub fn into_loaded(self) -> LoadedComposition {
        let total = self.nodes.len() + self.edges.len() + self.layers.len() + self.keys.len();

        let mut meta = CompositionMeta {
            name: self.name,
            description: self.description,
            bpm: self.bpm.unwrap_or(DEFAULT_BPM),
        };
        if let Err(e) = meta.validate() {
            log::warn!(target: "types::snapshot", "invalid composition metadata ({}), using defaults", e);
            let fallback = CompositionMeta::default();
            if meta.name.trim().is_empty() || meta.name.chars().count() > crate::schema::MAX_NAME_LEN {
                meta.name = fallback.name;
            }
            if !(crate::MIN_BPM..=crate::MAX_BPM).contains(&meta.bpm) {
                meta.bpm = fallback.bpm;
            }
            if meta.validate().is_err() {
                meta.description = String::new();
            }
        }

        let nodes: BTreeMap<NodeId, AudioNode> = self
            .nodes
            .into_iter()
            .filter_map(|(key, value)| {
                let raw: RawNode = parse_entry("node", &key, value)?;
                into_node(&key, raw)
            })
            .map(|n| (n.id, n))
            .collect();

        let edges: BTreeMap<EdgeId, AudioEdge> = self
            .edges
            .into_iter()
            .filter_map(|(key, value)| {
                let edge: AudioEdge = parse_entry("edge", &key, value)?;
                if !key_matches("edge", &key, edge.id.get()) {
                    return None;
                }
                let edge = check("edge", &key, edge)?;
                let (source, target) = match (nodes.get(&edge.source.node_id), nodes.get(&edge.target.node_id)) {
                    (Some(s), Some(t)) => (s, t),
                    _ => {
                        log::warn!(target: "types::snapshot", "dropping edge '{}': endpoint node missing", key);
                        return None;
                    }
                };
                if let Err(e) = validate_sockets(&edge, source.node_type, target.node_type) {
                    log::warn!(target: "types::snapshot", "dropping edge '{}': {}", key, e);
                    return None;
                }
                Some((edge.id, edge))
            })
            .collect();

        let layers: BTreeMap<LayerId, MusicLayer> = self
            .layers
            .into_iter()
            .filter_map(|(key, value)| {
                let layer: MusicLayer = parse_entry("layer", &key, value)?;
                if !key_matches("layer", &key, layer.id.get()) {
                    return None;
                }
                check("layer", &key, layer)
            })
            .map(|l| (l.id, l))
            .collect();

        let keys: BTreeMap<KeyId, MusicKey> = self
            .keys
            .into_iter()
            .filter_map(|(key, value)| {
                let music_key: MusicKey = parse_entry("key", &key, value)?;
                if !key_matches("key", &key, music_key.id.get()) {
                    return None;
                }
                let music_key = check("key", &key, music_key)?;
                if !layers.contains_key(&music_key.layer_id) {
                    log::warn!(target: "types::snapshot", "dropping key '{}': layer {} missing", key, music_key.layer_id);
                    return None;
                }
                Some(music_key)
            })
            .map(|k| (k.id, k))
            .collect();

        let kept = nodes.len() + edges.len() + layers.len() + keys.len();
        LoadedComposition {
            meta,
            nodes,
            edges,
            layers,
            keys,
            dropped: total - kept,
        }
    }
}

impl LoadedComposition {
    /// Serialize back into the snapshot shape.
    pub fn to_snapshot(&self) -> CompositionSnapshot {
        fn record<K: ToString, T: Serialize>(items: &BTreeMap<K, T>) -> BTreeMap<String, Value> {
            items
                .iter()
                .filter_map(|(k, v)| serde_json::to_value(v).ok().map(|v| (k.to_string(), v)))
                .collect()
        }
        CompositionSnapshot {
            name: self.meta.name.clone(),
            description: self.meta.description.clone(),
            bpm: Some(self.meta.bpm),
            nodes: record(&self.nodes),
            edges: record(&self.edges),
            layers: record(&self.layers),
            keys: record(&self.keys),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> CompositionSnapshot {
        serde_json::from_value(json!({
            "name": "Sketch",
            "description": "",
            "nodes": {
                "1": { "id": 1, "type": "synth", "label": "Lead", "position": { "x": 0.0, "y": 0.0 },
                       "properties": { "attack": 0.2, "cutoff": 900.0, "decay": "fast" } },
                "2": { "id": 2, "type": "output", "label": "Out", "position": { "x": 100.0, "y": 0.0 } },
                "3": { "id": 3, "type": "theremin", "label": "?", "position": { "x": 0.0, "y": 0.0 } }
            },
            "edges": {
                "10": { "id": 10, "source": { "node_id": 1, "socket": 0 }, "target": { "node_id": 2, "socket": 0 } },
                "11": { "id": 11, "source": { "node_id": 1, "socket": 0 }, "target": { "node_id": 3, "socket": 0 } },
                "12": { "id": 12, "source": { "node_id": 1, "socket": 4 }, "target": { "node_id": 2, "socket": 0 } }
            },
            "layers": {
                "20": { "id": 20, "name": "Melody" }
            },
            "keys": {
                "30": { "id": 30, "layer_id": 20, "instrument_id": 99, "note": 40, "time": 0.0, "duration": 2.0, "velocity": 0.7 },
                "31": { "id": 31, "layer_id": 21, "instrument_id": 1, "note": 40, "time": 0.0, "duration": 2.0, "velocity": 0.7 },
                "32": { "id": 32, "layer_id": 20, "instrument_id": 1, "note": 40, "time": 0.0, "duration": -2.0, "velocity": 0.7 }
            }
        }))
        .unwrap()
    }

    #[test]
    fn invalid_entries_are_dropped_individually() {
        let loaded = sample().into_loaded();
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(loaded.edges.len(), 1);
        assert!(loaded.edges.contains_key(&EdgeId::new(10)));
        assert_eq!(loaded.layers.len(), 1);
        // dangling instrument is fine, missing layer and bad duration are not
        assert_eq!(loaded.keys.len(), 1);
        assert!(loaded.keys.contains_key(&KeyId::new(30)));
        assert_eq!(loaded.dropped, 5);
    }

    #[test]
    fn malformed_properties_are_dropped_per_entry() {
        let loaded = sample().into_loaded();
        let lead = &loaded.nodes[&NodeId::new(1)];
        assert_eq!(lead.properties.len(), 1);
        assert_eq!(lead.property("attack"), Some(0.2));
        assert_eq!(lead.property("decay"), Some(0.1));
    }

    #[test]
    fn missing_bpm_defaults() {
        let loaded = sample().into_loaded();
        assert_eq!(loaded.meta.bpm, DEFAULT_BPM);
        assert_eq!(loaded.meta.name, "Sketch");
    }

    #[test]
    fn snapshot_round_trip_keeps_valid_entities() {
        let loaded = sample().into_loaded();
        let again = loaded.to_snapshot().into_loaded();
        assert_eq!(again.nodes, loaded.nodes);
        assert_eq!(again.edges, loaded.edges);
        assert_eq!(again.keys, loaded.keys);
        assert_eq!(again.dropped, 0);
    }
}
