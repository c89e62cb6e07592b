//! Patcher instances and what hangs off them (presets, message ports,
//! buffers), plus patchers and the runner transport.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A named preset stored with an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetRecord {
    /// Preset name, the key within its instance.
    pub name: String,
    /// Loaded when the instance starts.
    pub initial: bool,
    /// Most recently loaded.
    pub loaded: bool,
}

/// A message inport or outport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagePortRecord {
    /// Port tag, relative to `messages/in` or `messages/out`.
    pub tag: String,
    /// Full namespace path.
    pub path: String,
    /// Raw meta string.
    pub meta: String,
    /// Last value seen on an outport.
    pub last_value: Option<Value>,
}

impl MessagePortRecord {
    /// Port with no meta and no value.
    pub fn new(tag: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            path: path.into(),
            meta: String::new(),
            last_value: None,
        }
    }
}

/// A buffer of an instance, mapped to a file on the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataRefRecord {
    /// Buffer name, the key within its instance.
    pub name: String,
    /// Namespace path; sending a file name here maps the buffer.
    pub path: String,
    /// Mapped file, or empty when unmapped.
    pub file_name: String,
    /// Raw meta string.
    pub meta: String,
}

impl DataRefRecord {
    /// Unmapped buffer.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            file_name: String::new(),
            meta: String::new(),
        }
    }

    /// Whether a file is mapped.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        !self.file_name.is_empty()
    }
}

/// A running patcher instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceRecord {
    /// Instance index.
    pub index: u32,
    /// Name of the patcher it runs.
    pub patcher: String,
    /// Client name on the runner's audio server; doubles as the graph node id.
    pub jack_name: String,
    /// User-assigned alias.
    pub name_alias: String,
    /// Namespace path, `/rnbo/inst/<index>`.
    pub path: String,
    presets: BTreeMap<String, PresetRecord>,
    /// Message inports by tag.
    pub inports: BTreeMap<String, MessagePortRecord>,
    /// Message outports by tag.
    pub outports: BTreeMap<String, MessagePortRecord>,
    /// Buffers by name.
    pub data_refs: BTreeMap<String, DataRefRecord>,
}

impl InstanceRecord {
    /// Empty record for `index`, with the default client name.
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self {
            index,
            patcher: String::new(),
            jack_name: Self::default_jack_name(index),
            name_alias: String::new(),
            path: format!("{}/{index}", crate::constants::INSTANCES_PATH),
            presets: BTreeMap::new(),
            inports: BTreeMap::new(),
            outports: BTreeMap::new(),
            data_refs: BTreeMap::new(),
        }
    }

    /// Client name the runner uses when none is published.
    #[must_use]
    pub fn default_jack_name(index: u32) -> String {
        format!("rnbo-{index}")
    }

    /// Graph node id.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.jack_name
    }

    /// Alias if set, otherwise the patcher name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name_alias.is_empty() {
            &self.patcher
        } else {
            &self.name_alias
        }
    }

    /// Presets ordered by name.
    pub fn presets(&self) -> impl Iterator<Item = &PresetRecord> {
        self.presets.values()
    }

    /// Preset by name.
    #[must_use]
    pub fn preset(&self, name: &str) -> Option<&PresetRecord> {
        self.presets.get(name)
    }

    /// Replace the preset list, keeping the loaded/initial markers of presets
    /// that survive.
    pub fn set_preset_entries<S: AsRef<str>>(&mut self, names: &[S]) {
        let previous = std::mem::take(&mut self.presets);
        self.presets = names
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| !name.is_empty())
            .map(|name| {
                let (initial, loaded) = previous
                    .get(name)
                    .map_or((false, false), |p| (p.initial, p.loaded));
                (
                    name.to_string(),
                    PresetRecord {
                        name: name.to_string(),
                        initial,
                        loaded,
                    },
                )
            })
            .collect();
    }

    /// Mark `name` as the loaded preset.
    pub fn set_loaded_preset(&mut self, name: &str) {
        for preset in self.presets.values_mut() {
            preset.loaded = preset.name == name;
        }
    }

    /// Mark `name` as the initial preset.
    pub fn set_initial_preset(&mut self, name: &str) {
        for preset in self.presets.values_mut() {
            preset.initial = preset.name == name;
        }
    }

    /// Name of the loaded preset.
    #[must_use]
    pub fn loaded_preset(&self) -> Option<&str> {
        self.presets
            .values()
            .find(|p| p.loaded)
            .map(|p| p.name.as_str())
    }

    /// Record an outport value. Unknown tags create the port.
    pub fn set_outport_value(&mut self, tag: &str, value: Value) {
        let path = format!("{}/messages/out/{tag}", self.path);
        self.outports
            .entry(tag.to_string())
            .or_insert_with(|| MessagePortRecord::new(tag, path))
            .last_value = Some(value);
    }

    /// Record the file mapped to a buffer. Returns false for unknown buffers.
    pub fn set_data_ref_file(&mut self, name: &str, file_name: &str) -> bool {
        let Some(data_ref) = self.data_refs.get_mut(name) else {
            return false;
        };
        data_ref.file_name = file_name.to_string();
        true
    }

    /// Record a buffer's meta string. Returns false for unknown buffers.
    pub fn set_data_ref_meta(&mut self, name: &str, meta: &str) -> bool {
        let Some(data_ref) = self.data_refs.get_mut(name) else {
            return false;
        };
        data_ref.meta = meta.to_string();
        true
    }
}

/// A patcher available on the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatcherRecord {
    /// Patcher name, the key.
    pub name: String,
    /// Audio input count.
    pub audio_ins: u32,
    /// Audio output count.
    pub audio_outs: u32,
    /// MIDI input count.
    pub midi_ins: u32,
    /// MIDI output count.
    pub midi_outs: u32,
    /// When the patcher was exported, if published.
    pub created_at: Option<DateTime<Utc>>,
}

impl PatcherRecord {
    /// Patcher with no io.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            audio_ins: 0,
            audio_outs: 0,
            midi_ins: 0,
            midi_outs: 0,
            created_at: None,
        }
    }
}

/// The runner's musical transport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunnerTransport {
    /// Tempo.
    pub bpm: f64,
    /// Playing.
    pub rolling: bool,
    /// Following an external clock.
    pub sync: bool,
}

impl Default for RunnerTransport {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            rolling: false,
            sync: false,
        }
    }
}
