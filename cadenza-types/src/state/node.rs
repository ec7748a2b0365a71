use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{NodeId, NodeType};

pub const MAX_LABEL_LEN: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A processing unit instance in the composition graph.
///
/// `properties` is sparse: only overridden values are stored, everything else
/// falls back to the default declared by the node type's catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub label: String,
    pub position: Position,
    #[serde(default)]
    pub properties: BTreeMap<String, f64>,
}

impl AudioNode {
    pub fn new(id: NodeId, node_type: NodeType, position: Position) -> Self {
        Self {
            id,
            node_type,
            label: node_type.spec().label.to_string(),
            position,
            properties: BTreeMap::new(),
        }
    }

    /// Effective value of a property: the stored override or the catalog default.
    /// `None` if the node type has no such property.
    pub fn property(&self, name: &str) -> Option<f64> {
        let spec = self.node_type.spec().property(name)?;
        Some(self.properties.get(name).copied().unwrap_or(spec.default))
    }

    /// Every declared property paired with its effective value, in catalog order.
    pub fn effective_properties(&self) -> Vec<(&'static str, f64)> {
        self.node_type
            .spec()
            .properties
            .iter()
            .map(|p| (p.name, self.properties.get(p.name).copied().unwrap_or(p.default)))
            .collect()
    }

    pub fn apply(&mut self, patch: &NodePatch) {
        if let Some(label) = &patch.label {
            self.label = label.clone();
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(props) = &patch.properties {
            for (k, v) in props {
                self.properties.insert(k.clone(), *v);
            }
        }
    }
}

/// Partial node update. Properties merge per key (shallow overwrite).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, f64>>,
}

impl NodePatch {
    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    pub fn property(key: impl Into<String>, value: f64) -> Self {
        let mut props = BTreeMap::new();
        props.insert(key.into(), value);
        Self {
            properties: Some(props),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.position.is_none()
            && self.properties.as_ref().map_or(true, |p| p.is_empty())
    }

    pub fn merge(&mut self, newer: &NodePatch) {
        if newer.label.is_some() {
            self.label = newer.label.clone();
        }
        if newer.position.is_some() {
            self.position = newer.position;
        }
        if let Some(props) = &newer.properties {
            let merged = self.properties.get_or_insert_with(BTreeMap::new);
            for (k, v) in props {
                merged.insert(k.clone(), *v);
            }
        }
    }

    pub fn field_set(&self) -> u8 {
        (self.label.is_some() as u8) | (self.position.is_some() as u8) << 1 | (self.properties.is_some() as u8) << 2
    }

    /// Property keys touched by this patch (empty when no properties are set).
    pub fn property_keys(&self) -> Vec<&str> {
        self.properties
            .as_ref()
            .map(|p| p.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_properties_report_defaults() {
        let mut node = AudioNode::new(NodeId::new(1), NodeType::Reverb, Position::default());
        assert_eq!(node.property("decay"), Some(1.5));
        assert_eq!(node.property("wet"), Some(0.5));

        node.apply(&NodePatch::property("wet", 0.9));
        assert_eq!(node.property("wet"), Some(0.9));
        assert_eq!(node.property("decay"), Some(1.5));
        assert_eq!(node.property("pre_delay"), Some(0.01));
        assert_eq!(node.property("cutoff"), None);
    }

    #[test]
    fn patch_merge_accumulates_properties() {
        let mut a = NodePatch::property("ratio", 4.0);
        a.merge(&NodePatch::property("knee", 10.0));
        a.merge(&NodePatch::position(Position::new(5.0, 6.0)));
        let props = a.properties.as_ref().unwrap();
        assert_eq!(props.get("ratio"), Some(&4.0));
        assert_eq!(props.get("knee"), Some(&10.0));
        assert_eq!(a.position, Some(Position::new(5.0, 6.0)));
    }

    #[test]
    fn field_set_distinguishes_fields() {
        assert_ne!(
            NodePatch::position(Position::default()).field_set(),
            NodePatch::label("x").field_set()
        );
        assert_eq!(NodePatch::default().field_set(), 0);
    }
}
