//! Snapshot application for the synchronizer.
//!
//! Containers that map to whole entities (the instance list, one instance,
//! its parameters, message ports or buffers, the patcher list, the set-view
//! list, a configuration tree) are rebuilt from the subtree. Everything else is walked down to its value
//! leaves, which go through the same path as live OSC updates.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::address::{InstancePath, RunnerAddress};
use super::namespace::NamespaceNode;
use super::{Requests, Synchronizer};
use crate::model::{
    ConfigEntry, DataRefRecord, InstanceRecord, MessagePortRecord, ParameterRecord,
    PatcherRecord, PortSpec, RunnerInfoRecord,
};
use crate::osc::{self, DecodeOptions, OscMessage, OscType};

impl Synchronizer {
    pub(super) fn apply_node(&mut self, node: &NamespaceNode, requests: &mut Requests) {
        match RunnerAddress::parse(&node.full_path) {
            RunnerAddress::Patchers => {
                self.model.set_patchers(
                    node.contents
                        .iter()
                        .map(|(name, child)| patcher_from_node(name, child)),
                );
            }
            RunnerAddress::Patcher(name) if node.full_path.ends_with(&format!("/{name}")) => {
                self.model.upsert_patcher(patcher_from_node(&name, node));
            }
            RunnerAddress::Instances => self.apply_instances(node, requests),
            RunnerAddress::Instance(index, InstancePath::Root) => {
                self.apply_instance(index, node, requests);
            }
            RunnerAddress::Instance(index, InstancePath::Params) => {
                if self.model.instance(index).is_none() {
                    log::debug!("[Sync] Params for unknown instance {} ignored", index);
                    return;
                }
                self.model
                    .replace_parameters(index, parameters_from_node(index, node));
            }
            RunnerAddress::Instance(index, InstancePath::Messages) => {
                let Some(instance) = self.model.instance_mut(index) else {
                    log::debug!("[Sync] Messages for unknown instance {} ignored", index);
                    return;
                };
                apply_messages(instance, node);
            }
            RunnerAddress::Instance(index, InstancePath::DataRefs) => {
                let Some(instance) = self.model.instance_mut(index) else {
                    log::debug!("[Sync] Buffers for unknown instance {} ignored", index);
                    return;
                };
                instance.data_refs = data_refs_from_node(node);
            }
            RunnerAddress::RunnerInfo(key) if node.has_value() => {
                self.model.runner_mut().upsert_info(RunnerInfoRecord {
                    key,
                    description: node.description.clone().unwrap_or_default(),
                    value: node.value_f64().unwrap_or_default(),
                    path: node.full_path.clone(),
                });
            }
            RunnerAddress::Config(scope) => {
                self.model.runner_mut().clear_config(scope);
                self.apply_children(node, requests);
            }
            RunnerAddress::ConfigValue { scope, key } => {
                if node.has_value() {
                    self.model.runner_mut().upsert_config(ConfigEntry {
                        scope,
                        key,
                        path: node.full_path.clone(),
                        value: osc::args_value(&json_args(node), DecodeOptions::default()),
                        options: node.range_values(),
                        description: node.description.clone().unwrap_or_default(),
                    });
                }
                self.apply_children(node, requests);
            }
            RunnerAddress::SetList => {
                self.model.sets_mut().replace_sets(node.range_values());
            }
            RunnerAddress::SetViews => {
                let list = if node.full_path.ends_with("/list") {
                    Some(node)
                } else {
                    node.child("list")
                };
                if let Some(list) = list {
                    let ids: HashSet<u32> = list
                        .contents
                        .keys()
                        .filter_map(|k| k.parse().ok())
                        .collect();
                    self.model.sets_mut().retain_views(&ids);
                }
                self.apply_children(node, requests);
            }
            RunnerAddress::SetView(id) => {
                self.model.sets_mut().view_entry(id);
                self.apply_children(node, requests);
            }
            address => {
                if node.has_value() {
                    let msg = OscMessage::new(node.full_path.clone(), json_args(node));
                    self.apply_leaf_at(&address, &msg, requests);
                }
                self.apply_children(node, requests);
            }
        }
    }

    fn apply_children(&mut self, node: &NamespaceNode, requests: &mut Requests) {
        for child in node.contents.values() {
            self.apply_node(child, requests);
        }
    }

    fn apply_instances(&mut self, node: &NamespaceNode, requests: &mut Requests) {
        let mut present = HashSet::new();
        for (key, child) in &node.contents {
            match key.parse::<u32>() {
                Ok(index) if key.bytes().all(|b| b.is_ascii_digit()) => {
                    present.insert(index);
                    self.apply_instance(index, child, requests);
                }
                _ => self.apply_node(child, requests),
            }
        }
        self.model.retain_instances(&present);
        log::info!("[Sync] {} instances", present.len());
    }

    fn apply_instance(&mut self, index: u32, node: &NamespaceNode, requests: &mut Requests) {
        let mut record = self
            .model
            .instance(index)
            .cloned()
            .unwrap_or_else(|| InstanceRecord::new(index));

        if let Some(patcher) = node.descend("name").and_then(NamespaceNode::value_str) {
            record.patcher = patcher.to_string();
        }
        if let Some(alias) = node
            .descend("config/name_alias")
            .and_then(NamespaceNode::value_str)
        {
            record.name_alias = alias.to_string();
        }
        if let Some(jack_name) = node
            .descend("jack/name")
            .and_then(NamespaceNode::value_str)
            .filter(|n| !n.is_empty())
        {
            record.jack_name = jack_name.to_string();
        }
        if let Some(messages) = node.child("messages") {
            apply_messages(&mut record, messages);
        }
        if let Some(data_refs) = node.child("data_refs") {
            record.data_refs = data_refs_from_node(data_refs);
        }

        let ports = node.child("jack").map(io_ports).unwrap_or_default();
        let parameters = node
            .child("params")
            .map(|params| parameters_from_node(index, params))
            .unwrap_or_default();

        log::debug!(
            "[Sync] Instance {} ({}): {} ports, {} params",
            index,
            record.patcher,
            ports.len(),
            parameters.len()
        );
        self.model.upsert_instance(record, ports, parameters);

        // Presets and connection lists go through the leaf path now that the
        // instance exists.
        if let Some(presets) = node.child("presets") {
            self.apply_node(presets, requests);
        }
        if let Some(connections) = node.descend("jack/connections") {
            self.apply_node(connections, requests);
        }
    }
}

/// Convert a leaf's JSON value into OSC arguments.
pub(super) fn json_args(node: &NamespaceNode) -> Vec<OscType> {
    match node.type_tags.as_deref() {
        Some("T") if matches!(node.value, Some(Value::Null)) => return vec![OscType::Bool(true)],
        Some("F") if matches!(node.value, Some(Value::Null)) => return vec![OscType::Bool(false)],
        _ => {}
    }
    match &node.value {
        Some(Value::Array(items)) => items.iter().filter_map(json_arg).collect(),
        Some(value) => json_arg(value).into_iter().collect(),
        None => Vec::new(),
    }
}

fn json_arg(value: &Value) -> Option<OscType> {
    match value {
        Value::Null => Some(OscType::Nil),
        Value::Bool(b) => Some(OscType::Bool(*b)),
        Value::Number(n) => match n.as_i64().map(i32::try_from) {
            Some(Ok(i)) => Some(OscType::Int(i)),
            _ => n.as_f64().map(OscType::Double),
        },
        Value::String(s) => Some(OscType::String(s.clone())),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn patcher_from_node(name: &str, node: &NamespaceNode) -> PatcherRecord {
    let mut patcher = PatcherRecord::new(name);
    if let Some(io) = node.child("io") {
        let counts: Vec<u32> = io
            .value_numbers()
            .into_iter()
            .map(|n| n.max(0.0) as u32)
            .collect();
        if let [audio_ins, audio_outs, midi_ins, midi_outs, ..] = counts.as_slice() {
            patcher.audio_ins = *audio_ins;
            patcher.audio_outs = *audio_outs;
            patcher.midi_ins = *midi_ins;
            patcher.midi_outs = *midi_outs;
        }
    }
    patcher.created_at = node
        .child("created_at")
        .and_then(NamespaceNode::value_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));
    patcher
}

/// Full port names of an instance's io lists, from its `jack` container.
fn io_ports(jack: &NamespaceNode) -> BTreeMap<String, PortSpec> {
    let mut ports = BTreeMap::new();
    for child in jack.contents.values() {
        if let RunnerAddress::Instance(_, InstancePath::PortList(spec)) =
            RunnerAddress::parse(&child.full_path)
        {
            for name in child.value_strings() {
                ports.insert(name, spec);
            }
        }
    }
    ports
}

/// Build every parameter under a `params` container.
pub(super) fn parameters_from_node(instance: u32, params: &NamespaceNode) -> Vec<ParameterRecord> {
    params
        .value_leaves()
        .into_iter()
        .enumerate()
        .map(|(position, (name, leaf))| parameter_from_leaf(instance, position, name, leaf))
        .collect()
}

fn parameter_from_leaf(
    instance: u32,
    position: usize,
    name: String,
    leaf: &NamespaceNode,
) -> ParameterRecord {
    let index = leaf
        .descend("index")
        .and_then(NamespaceNode::value_f64)
        .map_or(position as u32, |i| i.max(0.0) as u32);
    let (min, max) = leaf.bounds();
    let mut param = ParameterRecord::new(
        instance,
        index,
        name,
        leaf.full_path.clone(),
        min.unwrap_or(0.0),
        max.unwrap_or(1.0),
    );

    param.enum_values = leaf.range_values();
    if param.is_enum() {
        param.min = 0.0;
        param.max = param.enum_values.len().saturating_sub(1) as f64;
    }
    if let Some(display_name) = leaf
        .descend("display_name")
        .and_then(NamespaceNode::value_str)
    {
        param.display_name = display_name.to_string();
    }

    match leaf.scalar() {
        Some(Value::String(s)) => {
            param.apply_enum_value(s);
        }
        Some(v) => {
            if let Some(v) = v.as_f64() {
                param.apply_value(v);
            }
        }
        None => {}
    }
    if let Some(normalized) = leaf
        .descend("normalized")
        .and_then(NamespaceNode::value_f64)
    {
        param.apply_normalized(normalized);
    }
    if let Some(meta) = leaf.descend("meta").and_then(NamespaceNode::value_str) {
        param.apply_meta(meta);
    }
    param
}

/// Rebuild message ports from a `messages`, `messages/in` or `messages/out`
/// container. Outports keep their last value.
fn apply_messages(instance: &mut InstanceRecord, node: &NamespaceNode) {
    let (inputs, outputs) = if node.full_path.ends_with("/in") {
        (Some(node), None)
    } else if node.full_path.ends_with("/out") {
        (None, Some(node))
    } else {
        (node.child("in"), node.child("out"))
    };

    if let Some(inputs) = inputs {
        instance.inports = message_ports(inputs, &BTreeMap::new());
    }
    if let Some(outputs) = outputs {
        instance.outports = message_ports(outputs, &instance.outports);
    }
}

fn data_refs_from_node(container: &NamespaceNode) -> BTreeMap<String, DataRefRecord> {
    container
        .contents
        .iter()
        .map(|(name, leaf)| {
            let mut data_ref = DataRefRecord::new(name.clone(), leaf.full_path.clone());
            data_ref.file_name = leaf.value_str().unwrap_or_default().to_string();
            if let Some(meta) = leaf.child("meta").and_then(NamespaceNode::value_str) {
                data_ref.meta = meta.to_string();
            }
            (name.clone(), data_ref)
        })
        .collect()
}

fn message_ports(
    container: &NamespaceNode,
    previous: &BTreeMap<String, MessagePortRecord>,
) -> BTreeMap<String, MessagePortRecord> {
    container
        .value_leaves()
        .into_iter()
        .map(|(tag, leaf)| {
            let mut port = MessagePortRecord::new(tag.clone(), leaf.full_path.clone());
            if let Some(meta) = leaf.descend("meta").and_then(NamespaceNode::value_str) {
                port.meta = meta.to_string();
            }
            port.last_value = previous.get(&tag).and_then(|p| p.last_value.clone());
            (tag, port)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConnectionType, PortDirection};

    fn node(json: &str) -> NamespaceNode {
        NamespaceNode::from_json(json).unwrap()
    }

    #[test]
    fn test_enum_parameter_from_leaf() {
        let params = node(
            r#"{"FULL_PATH": "/rnbo/inst/0/params", "CONTENTS": {
                "mode": {
                    "FULL_PATH": "/rnbo/inst/0/params/mode", "TYPE": "s", "VALUE": "saw",
                    "RANGE": [{"VALS": ["sine", "saw", "square"]}],
                    "CONTENTS": {
                        "index": {"FULL_PATH": "/rnbo/inst/0/params/mode/index", "TYPE": "i", "VALUE": 3},
                        "normalized": {"FULL_PATH": "/rnbo/inst/0/params/mode/normalized", "TYPE": "f", "VALUE": 0.5},
                        "meta": {"FULL_PATH": "/rnbo/inst/0/params/mode/meta", "TYPE": "s", "VALUE": "{\"midi\":{\"chan\":1,\"ctrl\":7}}"}
                    }
                }
            }}"#,
        );
        let parsed = parameters_from_node(0, &params);
        assert_eq!(parsed.len(), 1);
        let mode = &parsed[0];
        assert_eq!(mode.index, 3);
        assert_eq!(mode.value, 1.0);
        assert_eq!(mode.max, 2.0);
        assert_eq!(mode.normalized, 0.5);
        assert!(mode.midi_mapping.is_some());
        assert_eq!(mode.path, "/rnbo/inst/0/params/mode");
    }

    #[test]
    fn test_patcher_io_counts() {
        let patcher = patcher_from_node(
            "synth",
            &node(
                r#"{"FULL_PATH": "/rnbo/patchers/synth", "CONTENTS": {
                    "io": {"FULL_PATH": "/rnbo/patchers/synth/io", "TYPE": "iiii", "VALUE": [2, 2, 1, 0]},
                    "created_at": {"FULL_PATH": "/rnbo/patchers/synth/created_at", "TYPE": "s", "VALUE": "2024-03-01T10:00:00Z"}
                }}"#,
            ),
        );
        assert_eq!((patcher.audio_ins, patcher.audio_outs, patcher.midi_ins, patcher.midi_outs), (2, 2, 1, 0));
        assert!(patcher.created_at.is_some());
    }

    #[test]
    fn test_io_ports_read_all_lists() {
        let jack = node(
            r#"{"FULL_PATH": "/rnbo/inst/0/jack", "CONTENTS": {
                "name": {"FULL_PATH": "/rnbo/inst/0/jack/name", "TYPE": "s", "VALUE": "rnbo-0"},
                "audio_ins": {"FULL_PATH": "/rnbo/inst/0/jack/audio_ins", "TYPE": "s", "VALUE": ["rnbo-0:in1"]},
                "midi_outs": {"FULL_PATH": "/rnbo/inst/0/jack/midi_outs", "TYPE": "", "VALUE": []}
            }}"#,
        );
        let ports = io_ports(&jack);
        assert_eq!(ports.len(), 1);
        assert_eq!(
            ports["rnbo-0:in1"],
            PortSpec {
                direction: PortDirection::Sink,
                connection_type: ConnectionType::Audio
            }
        );
    }

    #[test]
    fn test_json_args() {
        let flag = node(r#"{"FULL_PATH": "/x", "TYPE": "F", "VALUE": null}"#);
        assert_eq!(json_args(&flag), vec![OscType::Bool(false)]);
        let list = node(r#"{"FULL_PATH": "/x", "TYPE": "sf", "VALUE": ["a", 1.5]}"#);
        assert_eq!(
            json_args(&list),
            vec![OscType::String("a".into()), OscType::Double(1.5)]
        );
    }

    #[test]
    fn test_data_refs_from_node() {
        let refs = data_refs_from_node(&node(
            r#"{"FULL_PATH": "/rnbo/inst/0/data_refs", "CONTENTS": {
                "samples": {"FULL_PATH": "/rnbo/inst/0/data_refs/samples", "TYPE": "s", "VALUE": "kick.wav",
                    "CONTENTS": {"meta": {"FULL_PATH": "/rnbo/inst/0/data_refs/samples/meta", "TYPE": "s", "VALUE": "{\"channels\":2}"}}},
                "table": {"FULL_PATH": "/rnbo/inst/0/data_refs/table", "TYPE": "s", "VALUE": ""}
            }}"#,
        ));
        assert_eq!(refs.len(), 2);
        assert_eq!(refs["samples"].file_name, "kick.wav");
        assert_eq!(refs["samples"].meta, r#"{"channels":2}"#);
        assert!(!refs["table"].is_mapped());
        assert_eq!(refs["table"].path, "/rnbo/inst/0/data_refs/table");
    }
}
