//! Fixed catalog of audio node types.
//!
//! Each type declares its group, socket counts and the numeric properties it
//! understands. This table is the single source of truth for valid property
//! names, ranges and defaults; the model store, the loader and the audio
//! mirror all consult it.

use serde::{Deserialize, Serialize};

/// Broad role of a node type in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeGroup {
    Instrument,
    Effect,
    Output,
    Component,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Output,
    Synth,
    Gain,
    Reverb,
    Vibrato,
    Compressor,
    Panner,
}

/// A named numeric property with its valid range and default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertySpec {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
}

impl PropertySpec {
    const fn new(name: &'static str, min: f64, max: f64, step: f64, default: f64) -> Self {
        Self { name, min, max, step, default }
    }

    /// Whether `value` is a finite number inside `min..=max`.
    pub fn accepts(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NodeTypeSpec {
    pub node_type: NodeType,
    pub group: NodeGroup,
    pub label: &'static str,
    pub inputs: u8,
    pub outputs: u8,
    pub properties: &'static [PropertySpec],
}

impl NodeTypeSpec {
    pub fn property(&self, name: &str) -> Option<&'static PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }
}

// Volume-like properties are stored on a 0..255 fader scale and remapped to
// decibels by the audio mirror.
const OUTPUT_PROPERTIES: &[PropertySpec] = &[PropertySpec::new("volume", 0.0, 255.0, 1.0, 200.0)];

const SYNTH_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("volume", 0.0, 255.0, 1.0, 200.0),
    PropertySpec::new("waveform", 0.0, 3.0, 1.0, 0.0),
    PropertySpec::new("detune", -1200.0, 1200.0, 1.0, 0.0),
    PropertySpec::new("attack", 0.0, 2.0, 0.01, 0.01),
    PropertySpec::new("decay", 0.0, 2.0, 0.01, 0.1),
    PropertySpec::new("sustain", 0.0, 1.0, 0.01, 0.3),
    PropertySpec::new("release", 0.0, 5.0, 0.01, 1.0),
];

const GAIN_PROPERTIES: &[PropertySpec] = &[PropertySpec::new("gain", 0.0, 255.0, 1.0, 128.0)];

const REVERB_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("decay", 0.1, 20.0, 0.1, 1.5),
    PropertySpec::new("pre_delay", 0.0, 1.0, 0.01, 0.01),
    PropertySpec::new("wet", 0.0, 1.0, 0.01, 0.5),
];

const VIBRATO_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("frequency", 0.1, 20.0, 0.1, 5.0),
    PropertySpec::new("depth", 0.0, 1.0, 0.01, 0.1),
    PropertySpec::new("wet", 0.0, 1.0, 0.01, 1.0),
];

const COMPRESSOR_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("threshold", 0.0, 255.0, 1.0, 200.0),
    PropertySpec::new("ratio", 1.0, 20.0, 0.5, 12.0),
    PropertySpec::new("attack", 0.0, 1.0, 0.001, 0.003),
    PropertySpec::new("release", 0.0, 1.0, 0.01, 0.25),
    PropertySpec::new("knee", 0.0, 40.0, 1.0, 30.0),
];

const PANNER_PROPERTIES: &[PropertySpec] = &[PropertySpec::new("pan", -1.0, 1.0, 0.01, 0.0)];

const CATALOG: &[NodeTypeSpec] = &[
    NodeTypeSpec {
        node_type: NodeType::Output,
        group: NodeGroup::Output,
        label: "Output",
        inputs: 1,
        outputs: 0,
        properties: OUTPUT_PROPERTIES,
    },
    NodeTypeSpec {
        node_type: NodeType::Synth,
        group: NodeGroup::Instrument,
        label: "Synth",
        inputs: 0,
        outputs: 1,
        properties: SYNTH_PROPERTIES,
    },
    NodeTypeSpec {
        node_type: NodeType::Gain,
        group: NodeGroup::Component,
        label: "Gain",
        inputs: 1,
        outputs: 1,
        properties: GAIN_PROPERTIES,
    },
    NodeTypeSpec {
        node_type: NodeType::Reverb,
        group: NodeGroup::Effect,
        label: "Reverb",
        inputs: 1,
        outputs: 1,
        properties: REVERB_PROPERTIES,
    },
    NodeTypeSpec {
        node_type: NodeType::Vibrato,
        group: NodeGroup::Effect,
        label: "Vibrato",
        inputs: 1,
        outputs: 1,
        properties: VIBRATO_PROPERTIES,
    },
    NodeTypeSpec {
        node_type: NodeType::Compressor,
        group: NodeGroup::Effect,
        label: "Compressor",
        inputs: 1,
        outputs: 1,
        properties: COMPRESSOR_PROPERTIES,
    },
    NodeTypeSpec {
        node_type: NodeType::Panner,
        group: NodeGroup::Component,
        label: "Panner",
        inputs: 1,
        outputs: 1,
        properties: PANNER_PROPERTIES,
    },
];

impl NodeType {
    pub const ALL: [NodeType; 7] = [
        NodeType::Output,
        NodeType::Synth,
        NodeType::Gain,
        NodeType::Reverb,
        NodeType::Vibrato,
        NodeType::Compressor,
        NodeType::Panner,
    ];

    pub fn spec(self) -> &'static NodeTypeSpec {
        // CATALOG is ordered like the enum
        &CATALOG[self as usize]
    }

    pub fn group(self) -> NodeGroup {
        self.spec().group
    }

    pub fn is_instrument(self) -> bool {
        self.group() == NodeGroup::Instrument
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Output => "output",
            NodeType::Synth => "synth",
            NodeType::Gain => "gain",
            NodeType::Reverb => "reverb",
            NodeType::Vibrato => "vibrato",
            NodeType::Compressor => "compressor",
            NodeType::Panner => "panner",
        }
    }

    pub fn parse(s: &str) -> Option<NodeType> {
        NodeType::ALL.into_iter().find(|t| t.as_str() == s)
    }
}
