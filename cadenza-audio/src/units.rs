//! Node type → unit construction and property setters.
//!
//! Each node type maps to one backend unit kind plus a setter per catalog
//! property. Setters translate stored values into what the unit expects
//! (fader positions become decibels, for instance).

use cadenza_types::{AudioNode, NodeType};

/// Fader scale used by volume-like properties.
pub const FADER_MAX: f64 = 255.0;
/// Quietest level a fader maps to.
pub const FADER_FLOOR_DB: f64 = -60.0;
/// Fader position that maps to unity gain.
pub const FADER_UNITY: f64 = 128.0;

/// Linearly remap `value` from `from` into `to`, clamping to the source range.
pub fn linear_remap(value: f64, from: (f64, f64), to: (f64, f64)) -> f64 {
    let (a, b) = from;
    let (c, d) = to;
    if (b - a).abs() < f64::EPSILON {
        return c;
    }
    let t = ((value - a) / (b - a)).clamp(0.0, 1.0);
    c + t * (d - c)
}

/// 0..255 fader position to -60..0 dB.
pub fn fader_to_decibels(value: f64) -> f64 {
    linear_remap(value, (0.0, FADER_MAX), (FADER_FLOOR_DB, 0.0))
}

/// 0..255 threshold position to -100..0 dB.
pub fn threshold_to_decibels(value: f64) -> f64 {
    linear_remap(value, (0.0, FADER_MAX), (-100.0, 0.0))
}

/// 0..255 gain position to a linear multiplier where 128 is unity.
pub fn fader_to_gain(value: f64) -> f64 {
    value.max(0.0) / FADER_UNITY
}

fn identity(value: f64) -> f64 {
    value
}

/// Frequency in Hz of a note index, where index 0 is C0 and 57 is A4.
pub fn note_frequency(note: u8) -> f64 {
    440.0 * 2f64.powf((note as f64 - 57.0) / 12.0)
}

/// How one catalog property reaches the unit.
#[derive(Debug, Clone, Copy)]
pub struct ParamSetter {
    pub property: &'static str,
    pub param: &'static str,
    pub map: fn(f64) -> f64,
}

const fn setter(property: &'static str, param: &'static str, map: fn(f64) -> f64) -> ParamSetter {
    ParamSetter { property, param, map }
}

#[derive(Debug, Clone, Copy)]
pub struct UnitDef {
    pub kind: &'static str,
    pub setters: &'static [ParamSetter],
}

impl UnitDef {
    pub fn setter(&self, property: &str) -> Option<&'static ParamSetter> {
        self.setters.iter().find(|s| s.property == property)
    }

    /// Initial parameter list for constructing a unit from `node`, using the
    /// node's effective property values.
    pub fn initial_params(&self, node: &AudioNode) -> Vec<(&'static str, f64)> {
        self.setters
            .iter()
            .filter_map(|s| node.property(s.property).map(|v| (s.param, (s.map)(v))))
            .collect()
    }
}

const OUTPUT: UnitDef = UnitDef {
    kind: "destination",
    setters: &[setter("volume", "volume", fader_to_decibels)],
};

const SYNTH: UnitDef = UnitDef {
    kind: "poly_synth",
    setters: &[
        setter("volume", "volume", fader_to_decibels),
        setter("waveform", "oscillator_type", identity),
        setter("detune", "detune", identity),
        setter("attack", "envelope_attack", identity),
        setter("decay", "envelope_decay", identity),
        setter("sustain", "envelope_sustain", identity),
        setter("release", "envelope_release", identity),
    ],
};

const GAIN: UnitDef = UnitDef {
    kind: "gain",
    setters: &[setter("gain", "gain", fader_to_gain)],
};

const REVERB: UnitDef = UnitDef {
    kind: "reverb",
    setters: &[
        setter("decay", "decay", identity),
        setter("pre_delay", "pre_delay", identity),
        setter("wet", "wet", identity),
    ],
};

const VIBRATO: UnitDef = UnitDef {
    kind: "vibrato",
    setters: &[
        setter("frequency", "frequency", identity),
        setter("depth", "depth", identity),
        setter("wet", "wet", identity),
    ],
};

const COMPRESSOR: UnitDef = UnitDef {
    kind: "compressor",
    setters: &[
        setter("threshold", "threshold", threshold_to_decibels),
        setter("ratio", "ratio", identity),
        setter("attack", "attack", identity),
        setter("release", "release", identity),
        setter("knee", "knee", identity),
    ],
};

const PANNER: UnitDef = UnitDef {
    kind: "panner",
    setters: &[setter("pan", "pan", identity)],
};

/// Unit definition for a node type.
pub fn unit_def(node_type: NodeType) -> &'static UnitDef {
    match node_type {
        NodeType::Output => &OUTPUT,
        NodeType::Synth => &SYNTH,
        NodeType::Gain => &GAIN,
        NodeType::Reverb => &REVERB,
        NodeType::Vibrato => &VIBRATO,
        NodeType::Compressor => &COMPRESSOR,
        NodeType::Panner => &PANNER,
    }
}
