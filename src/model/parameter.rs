//! Parameter records and value normalization.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

/// Parameter identity: `(instance, parameter index)`.
///
/// Rendered and parsed as `"<instance>:<index>"`, the form set views use to
/// list their members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ParameterKey {
    /// Owning instance index.
    pub instance: u32,
    /// Parameter index within the instance.
    pub index: u32,
}

impl ParameterKey {
    /// Build a key.
    #[must_use]
    pub fn new(instance: u32, index: u32) -> Self {
        Self { instance, index }
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.instance, self.index)
    }
}

impl FromStr for ParameterKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (instance, index) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <instance>:<index>, got {s:?}"))?;
        let instance = instance
            .parse()
            .map_err(|e| format!("bad instance in {s:?}: {e}"))?;
        let index = index
            .parse()
            .map_err(|e| format!("bad parameter index in {s:?}: {e}"))?;
        Ok(Self { instance, index })
    }
}

/// MIDI control bound to a parameter, as published in its meta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MidiMapping {
    /// Control change `{chan, ctrl}`.
    ControlChange {
        /// MIDI channel.
        channel: u8,
        /// Controller number.
        control: u8,
    },
    /// Note `{chan, note}`.
    Note {
        /// MIDI channel.
        channel: u8,
        /// Note number.
        note: u8,
    },
    /// Polyphonic key pressure `{chan, keypress}`.
    KeyPressure {
        /// MIDI channel.
        channel: u8,
        /// Note number.
        note: u8,
    },
    /// Pitch bend `{bend}`.
    PitchBend {
        /// MIDI channel.
        channel: u8,
    },
    /// Program change `{prgchg}`.
    ProgramChange {
        /// MIDI channel.
        channel: u8,
    },
    /// Channel pressure `{chanpress}`.
    ChannelPressure {
        /// MIDI channel.
        channel: u8,
    },
}

impl MidiMapping {
    /// Detect a mapping in a parsed meta object (`{"midi": {...}}`).
    #[must_use]
    pub fn from_meta(meta: &Value) -> Option<Self> {
        let midi = meta.get("midi")?.as_object()?;
        let field = |key: &str| {
            midi.get(key)
                .and_then(Value::as_u64)
                .and_then(|v| u8::try_from(v).ok())
        };

        if let Some(channel) = field("bend") {
            return Some(Self::PitchBend { channel });
        }
        if let Some(channel) = field("prgchg") {
            return Some(Self::ProgramChange { channel });
        }
        if let Some(channel) = field("chanpress") {
            return Some(Self::ChannelPressure { channel });
        }

        let channel = field("chan")?;
        if let Some(control) = field("ctrl") {
            Some(Self::ControlChange { channel, control })
        } else if let Some(note) = field("note") {
            Some(Self::Note { channel, note })
        } else {
            field("keypress").map(|note| Self::KeyPressure { channel, note })
        }
    }
}

/// Parse a meta string leniently; anything but a JSON object is empty meta.
#[must_use]
pub fn parse_meta(meta: &str) -> Value {
    // The runner sometimes publishes single-character placeholders.
    if meta.len() <= 1 {
        return Value::Object(serde_json::Map::new());
    }
    match serde_json::from_str::<Value>(meta) {
        Ok(v @ Value::Object(_)) => v,
        _ => Value::Object(serde_json::Map::new()),
    }
}

/// Map `value` into `[0, 1]`.
///
/// Continuous: `(value - min) / (max - min)`, clamped; a zero-width range maps
/// to 0. Enumerated (`enum_count > 0`): `index / (enum_count - 1)` with the
/// index rounded and clamped; fewer than two values map to 0.
#[must_use]
pub fn normalize(value: f64, min: f64, max: f64, enum_count: usize) -> f64 {
    if enum_count > 0 {
        if enum_count < 2 {
            return 0.0;
        }
        let last = (enum_count - 1) as f64;
        return value.round().clamp(0.0, last) / last;
    }
    let span = max - min;
    if span == 0.0 || !span.is_finite() {
        return 0.0;
    }
    ((value - min) / span).clamp(0.0, 1.0)
}

/// Inverse of [`normalize`]. Enumerated parameters snap to the nearest index.
#[must_use]
pub fn denormalize(normalized: f64, min: f64, max: f64, enum_count: usize) -> f64 {
    let normalized = normalized.clamp(0.0, 1.0);
    if enum_count > 0 {
        if enum_count < 2 {
            return 0.0;
        }
        return (normalized * (enum_count - 1) as f64).round();
    }
    min + normalized * (max - min)
}

/// One instance parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterRecord {
    /// Owning instance index.
    pub instance_id: u32,
    /// Index within the instance.
    pub index: u32,
    /// Name relative to the instance's `params` container (`poly/1/gain`).
    pub name: String,
    /// Optional display name.
    pub display_name: String,
    /// Full namespace path of the value leaf.
    pub path: String,
    /// Current value. Enumerated parameters hold the enum index.
    pub value: f64,
    /// Range minimum.
    pub min: f64,
    /// Range maximum.
    pub max: f64,
    /// Enumerated values, empty for continuous parameters.
    pub enum_values: Vec<String>,
    /// Value in `[0, 1]`.
    pub normalized: f64,
    /// Raw meta string as published.
    pub meta_string: String,
    /// Parsed meta object.
    pub meta: Value,
    /// MIDI binding detected in the meta.
    pub midi_mapping: Option<MidiMapping>,
    /// Set by local optimistic edits; cleared by the next remote update.
    pub provisional: bool,
}

impl ParameterRecord {
    /// Continuous parameter with value 0 in `[min, max]`.
    pub fn new(instance_id: u32, index: u32, name: impl Into<String>, path: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            instance_id,
            index,
            name: name.into(),
            display_name: String::new(),
            path: path.into(),
            value: min,
            min,
            max,
            enum_values: Vec::new(),
            normalized: 0.0,
            meta_string: String::new(),
            meta: Value::Object(serde_json::Map::new()),
            midi_mapping: None,
            provisional: false,
        }
    }

    /// Identity.
    #[must_use]
    pub fn key(&self) -> ParameterKey {
        ParameterKey::new(self.instance_id, self.index)
    }

    /// Whether the parameter is enumerated.
    #[must_use]
    pub fn is_enum(&self) -> bool {
        !self.enum_values.is_empty()
    }

    /// Display name if set, otherwise the name.
    #[must_use]
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    /// `value` mapped into `[0, 1]`.
    #[must_use]
    pub fn normalize(&self, value: f64) -> f64 {
        normalize(value, self.min, self.max, self.enum_values.len())
    }

    /// Display value for a normalized slider position.
    #[must_use]
    pub fn denormalize(&self, normalized: f64) -> f64 {
        denormalize(normalized, self.min, self.max, self.enum_values.len())
    }

    /// Index of `name` in the enum list.
    #[must_use]
    pub fn enum_index(&self, name: &str) -> Option<usize> {
        self.enum_values.iter().position(|v| v == name)
    }

    /// Current value as text: the enum entry, or the number.
    #[must_use]
    pub fn value_label(&self) -> String {
        if self.is_enum() {
            let idx = self.value.round().max(0.0) as usize;
            if let Some(name) = self.enum_values.get(idx) {
                return name.clone();
            }
        }
        self.value.to_string()
    }

    /// Apply an authoritative value. Clears the provisional flag.
    pub fn apply_value(&mut self, value: f64) {
        self.value = value;
        self.normalized = self.normalize(value);
        self.provisional = false;
    }

    /// Apply an authoritative enum value by name. Unknown names are ignored.
    pub fn apply_enum_value(&mut self, name: &str) -> bool {
        match self.enum_index(name) {
            Some(idx) => {
                self.apply_value(idx as f64);
                true
            }
            None => false,
        }
    }

    /// Apply an authoritative normalized value. Clears the provisional flag.
    pub fn apply_normalized(&mut self, normalized: f64) {
        self.normalized = normalized.clamp(0.0, 1.0);
        self.provisional = false;
    }

    /// Apply a local edit ahead of confirmation.
    pub fn set_provisional_normalized(&mut self, normalized: f64) {
        self.normalized = normalized.clamp(0.0, 1.0);
        self.value = self.denormalize(self.normalized);
        self.provisional = true;
    }

    /// Replace the meta, re-detecting any MIDI binding.
    pub fn apply_meta(&mut self, meta: &str) {
        self.meta_string = meta.to_string();
        self.meta = parse_meta(meta);
        self.midi_mapping = MidiMapping::from_meta(&self.meta);
    }
}
