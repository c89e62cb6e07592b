//! Outbound commands - application intents encoded as OSC messages.
//!
//! Every command maps to one fixed address with the argument arity that
//! address expects. Encoding is pure; sending, and the decision to drop a
//! command while disconnected, belong to the bridge.
//!
//! Nothing waits for an acknowledgement. Success shows up as the matching
//! state change arriving back through the synchronizer.

use crate::constants::{
    INSTANCE_CONTROL_PATH, JACK_RECORD_PATH, JACK_TRANSPORT_PATH, SETS_PATH, SET_VIEWS_PATH,
};
use crate::model::{ConfigScope, ConnectionError, ParameterKey};
use crate::osc::{self, OscMessage, OscType};

/// Why a command was not sent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    /// The transport is not open; the command was dropped.
    #[error("not connected to the runner")]
    NotConnected,
    /// No such parameter in the model.
    #[error("unknown parameter {0}")]
    UnknownParameter(ParameterKey),
    /// No such instance in the model.
    #[error("unknown instance {0}")]
    UnknownInstance(u32),
    /// The instance has no buffer by that name.
    #[error("instance {instance} has no buffer {name:?}")]
    UnknownDataRef {
        /// Instance index.
        instance: u32,
        /// Buffer name.
        name: String,
    },
    /// The proposed connection fails validation.
    #[error("invalid connection: {0}")]
    InvalidConnection(#[from] ConnectionError),
}

/// An intent to change runner state.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // === Sets ===
    /// Load a graph set by name.
    LoadSet(String),
    /// Save the current graph under a name.
    SaveSet(String),
    /// Delete a graph set.
    DestroySet(String),
    /// Rename a graph set.
    RenameSet {
        /// Current name.
        old: String,
        /// New name.
        new: String,
    },
    /// Choose the set loaded at startup.
    SetInitialSet(String),

    // === Set views ===
    /// Create a view from a parameter list.
    CreateSetView {
        /// Display name.
        name: String,
        /// Members in display order.
        params: Vec<ParameterKey>,
    },
    /// Delete a view.
    DestroySetView(u32),
    /// Rename a view.
    RenameSetView {
        /// View id.
        id: u32,
        /// New name.
        name: String,
    },
    /// Replace a view's member list.
    SetViewParams {
        /// View id.
        id: u32,
        /// Members in display order.
        params: Vec<ParameterKey>,
    },
    /// Reorder views.
    SetViewOrder(Vec<u32>),

    // === Parameters ===
    /// Set a parameter by value.
    SetParameterValue {
        /// Value-leaf path.
        path: String,
        /// New value.
        value: f64,
    },
    /// Set a parameter by normalized value.
    SetParameterNormalized {
        /// Value-leaf path.
        path: String,
        /// New value in `[0, 1]`.
        normalized: f64,
    },
    /// Replace a parameter's meta string.
    SetParameterMeta {
        /// Value-leaf path.
        path: String,
        /// JSON meta, or empty to clear.
        meta: String,
    },

    // === Connections ===
    /// Connect two ports, by full port name.
    ConnectPorts {
        /// Source port.
        source: String,
        /// Sink port.
        sink: String,
    },
    /// Disconnect two ports, by full port name.
    DisconnectPorts {
        /// Source port.
        source: String,
        /// Sink port.
        sink: String,
    },

    // === Presets ===
    /// Load a preset into an instance.
    LoadPreset {
        /// Instance index.
        instance: u32,
        /// Preset name.
        name: String,
    },
    /// Save an instance's state as a preset.
    SavePreset {
        /// Instance index.
        instance: u32,
        /// Preset name.
        name: String,
    },
    /// Delete a preset.
    DeletePreset {
        /// Instance index.
        instance: u32,
        /// Preset name.
        name: String,
    },
    /// Rename a preset.
    RenamePreset {
        /// Instance index.
        instance: u32,
        /// Current name.
        old: String,
        /// New name.
        new: String,
    },
    /// Choose the preset loaded when the instance starts.
    SetInitialPreset {
        /// Instance index.
        instance: u32,
        /// Preset name.
        name: String,
    },

    // === Instances ===
    /// Start a patcher, optionally at a given index.
    LoadInstance {
        /// Patcher name.
        patcher: String,
        /// Instance index; `None` lets the runner pick.
        index: Option<u32>,
    },
    /// Stop an instance.
    UnloadInstance(u32),
    /// Set an instance's alias.
    SetInstanceAlias {
        /// Instance index.
        instance: u32,
        /// Alias, or empty to clear.
        alias: String,
    },
    /// Send a message to an instance inport.
    SendMessage {
        /// Instance index.
        instance: u32,
        /// Inport tag.
        tag: String,
        /// Message arguments.
        args: Vec<OscType>,
    },

    // === Buffers ===
    /// Map a file to an instance buffer.
    SetDataRef {
        /// Instance index.
        instance: u32,
        /// Buffer name.
        name: String,
        /// File name on the runner, or empty to unmap.
        file: String,
    },
    /// Replace a buffer's meta string.
    SetDataRefMeta {
        /// Instance index.
        instance: u32,
        /// Buffer name.
        name: String,
        /// JSON meta, or empty to restore the default.
        meta: String,
    },

    // === Runner ===
    /// Start or stop the stream recorder.
    SetRecording(bool),
    /// Change a configuration value.
    SetConfig {
        /// Which tree.
        scope: ConfigScope,
        /// Key relative to the container.
        key: String,
        /// New value.
        value: OscType,
    },

    // === Transport ===
    /// Set the tempo.
    SetTempo(f64),
    /// Start or stop the transport.
    SetRolling(bool),
    /// Follow or ignore an external clock.
    SetSync(bool),
}

fn instance_path(instance: u32) -> String {
    format!("{}/{instance}", crate::constants::INSTANCES_PATH)
}

fn view_entries(params: &[ParameterKey]) -> impl Iterator<Item = OscType> + '_ {
    params.iter().map(|key| OscType::String(key.to_string()))
}

impl Command {
    /// Encode as an OSC message.
    #[must_use]
    pub fn encode(&self) -> OscMessage {
        let s = |v: &str| OscType::String(v.to_string());
        match self {
            Self::LoadSet(name) => OscMessage::new(format!("{SETS_PATH}/load"), vec![s(name)]),
            Self::SaveSet(name) => OscMessage::new(format!("{SETS_PATH}/save"), vec![s(name)]),
            Self::DestroySet(name) => {
                OscMessage::new(format!("{SETS_PATH}/destroy"), vec![s(name)])
            }
            Self::RenameSet { old, new } => {
                OscMessage::new(format!("{SETS_PATH}/rename"), vec![s(old), s(new)])
            }
            Self::SetInitialSet(name) => {
                OscMessage::new(format!("{SETS_PATH}/initial"), vec![s(name)])
            }

            Self::CreateSetView { name, params } => OscMessage::new(
                format!("{SET_VIEWS_PATH}/create"),
                std::iter::once(s(name)).chain(view_entries(params)).collect(),
            ),
            Self::DestroySetView(id) => OscMessage::new(
                format!("{SET_VIEWS_PATH}/destroy"),
                vec![OscType::Int(*id as i32)],
            ),
            Self::RenameSetView { id, name } => {
                OscMessage::new(format!("{SET_VIEWS_PATH}/list/{id}/name"), vec![s(name)])
            }
            Self::SetViewParams { id, params } => OscMessage::new(
                format!("{SET_VIEWS_PATH}/list/{id}/params"),
                view_entries(params).collect(),
            ),
            Self::SetViewOrder(order) => OscMessage::new(
                format!("{SET_VIEWS_PATH}/order"),
                order.iter().map(|id| OscType::Int(*id as i32)).collect(),
            ),

            Self::SetParameterValue { path, value } => {
                OscMessage::new(path.clone(), vec![OscType::Float(*value as f32)])
            }
            Self::SetParameterNormalized { path, normalized } => OscMessage::new(
                format!("{path}/normalized"),
                vec![OscType::Float(normalized.clamp(0.0, 1.0) as f32)],
            ),
            Self::SetParameterMeta { path, meta } => {
                OscMessage::new(format!("{path}/meta"), vec![s(meta)])
            }

            Self::ConnectPorts { source, sink } => OscMessage::new(
                "/rnbo/jack/connections/connect",
                vec![s(source), s(sink)],
            ),
            Self::DisconnectPorts { source, sink } => OscMessage::new(
                "/rnbo/jack/connections/disconnect",
                vec![s(source), s(sink)],
            ),

            Self::LoadPreset { instance, name } => OscMessage::new(
                format!("{}/presets/load", instance_path(*instance)),
                vec![s(name)],
            ),
            Self::SavePreset { instance, name } => OscMessage::new(
                format!("{}/presets/save", instance_path(*instance)),
                vec![s(name)],
            ),
            Self::DeletePreset { instance, name } => OscMessage::new(
                format!("{}/presets/delete", instance_path(*instance)),
                vec![s(name)],
            ),
            Self::RenamePreset { instance, old, new } => OscMessage::new(
                format!("{}/presets/rename", instance_path(*instance)),
                vec![s(old), s(new)],
            ),
            Self::SetInitialPreset { instance, name } => OscMessage::new(
                format!("{}/presets/initial", instance_path(*instance)),
                vec![s(name)],
            ),

            Self::LoadInstance { patcher, index } => OscMessage::new(
                format!("{INSTANCE_CONTROL_PATH}/load"),
                vec![
                    OscType::Int(index.map_or(-1, |i| i as i32)),
                    s(patcher),
                ],
            ),
            Self::UnloadInstance(index) => OscMessage::new(
                format!("{INSTANCE_CONTROL_PATH}/unload"),
                vec![OscType::Int(*index as i32)],
            ),
            Self::SetInstanceAlias { instance, alias } => OscMessage::new(
                format!("{}/config/name_alias", instance_path(*instance)),
                vec![s(alias)],
            ),
            Self::SendMessage {
                instance,
                tag,
                args,
            } => OscMessage::new(
                format!("{}/messages/in/{tag}", instance_path(*instance)),
                args.clone(),
            ),

            Self::SetDataRef {
                instance,
                name,
                file,
            } => OscMessage::new(
                format!("{}/data_refs/{name}", instance_path(*instance)),
                vec![s(file)],
            ),
            Self::SetDataRefMeta {
                instance,
                name,
                meta,
            } => OscMessage::new(
                format!("{}/data_refs/{name}/meta", instance_path(*instance)),
                vec![s(meta)],
            ),

            Self::SetRecording(active) => OscMessage::new(
                format!("{JACK_RECORD_PATH}/active"),
                vec![OscType::Bool(*active)],
            ),
            Self::SetConfig { scope, key, value } => {
                OscMessage::new(format!("{}/{key}", scope.path()), vec![value.clone()])
            }

            Self::SetTempo(bpm) => OscMessage::new(
                format!("{JACK_TRANSPORT_PATH}/bpm"),
                vec![OscType::Float(*bpm as f32)],
            ),
            Self::SetRolling(rolling) => OscMessage::new(
                format!("{JACK_TRANSPORT_PATH}/rolling"),
                vec![OscType::Bool(*rolling)],
            ),
            Self::SetSync(sync) => OscMessage::new(
                format!("{JACK_TRANSPORT_PATH}/sync"),
                vec![OscType::Bool(*sync)],
            ),
        }
    }

    /// Encode straight to wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        osc::encode_message(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_set_encoding() {
        let msg = Command::LoadSet("Factory".into()).encode();
        assert_eq!(msg.addr, "/rnbo/inst/control/sets/load");
        assert_eq!(msg.args, vec![OscType::String("Factory".into())]);
        assert_eq!(msg.type_tags(), ",s");
    }

    #[test]
    fn test_rename_takes_two_strings() {
        let msg = Command::RenameSet {
            old: "A".into(),
            new: "B".into(),
        }
        .encode();
        assert_eq!(msg.addr, "/rnbo/inst/control/sets/rename");
        assert_eq!(msg.type_tags(), ",ss");
    }

    #[test]
    fn test_parameter_addresses() {
        let path = "/rnbo/inst/0/params/gain".to_string();
        let value = Command::SetParameterValue {
            path: path.clone(),
            value: 0.25,
        }
        .encode();
        assert_eq!(value.addr, path);
        assert_eq!(value.args, vec![OscType::Float(0.25)]);

        let normalized = Command::SetParameterNormalized {
            path,
            normalized: 1.5,
        }
        .encode();
        assert_eq!(normalized.addr, "/rnbo/inst/0/params/gain/normalized");
        assert_eq!(normalized.args, vec![OscType::Float(1.0)]);
    }

    #[test]
    fn test_view_params_use_instance_index_entries() {
        let msg = Command::SetViewParams {
            id: 2,
            params: vec![ParameterKey::new(0, 3), ParameterKey::new(1, 0)],
        }
        .encode();
        assert_eq!(msg.addr, "/rnbo/inst/control/sets/views/list/2/params");
        assert_eq!(msg.string_args(), vec!["0:3", "1:0"]);
    }

    #[test]
    fn test_load_instance_defaults_index() {
        let msg = Command::LoadInstance {
            patcher: "synth".into(),
            index: None,
        }
        .encode();
        assert_eq!(msg.addr, "/rnbo/inst/control/load");
        assert_eq!(msg.args[0], OscType::Int(-1));
    }

    #[test]
    fn test_transport_flags() {
        let msg = Command::SetRolling(true).encode();
        assert_eq!(msg.addr, "/rnbo/jack/transport/rolling");
        assert_eq!(msg.type_tags(), ",T");
    }

    #[test]
    fn test_data_ref_addresses() {
        let map = Command::SetDataRef {
            instance: 2,
            name: "samples".into(),
            file: String::new(),
        }
        .encode();
        assert_eq!(map.addr, "/rnbo/inst/2/data_refs/samples");
        assert_eq!(map.args, vec![OscType::String(String::new())]);

        let meta = Command::SetDataRefMeta {
            instance: 2,
            name: "samples".into(),
            meta: "{}".into(),
        }
        .encode();
        assert_eq!(meta.addr, "/rnbo/inst/2/data_refs/samples/meta");
    }

    #[test]
    fn test_runner_commands() {
        let msg = Command::SetRecording(false).encode();
        assert_eq!(msg.addr, "/rnbo/jack/record/active");
        assert_eq!(msg.type_tags(), ",F");

        let msg = Command::SetConfig {
            scope: ConfigScope::Jack,
            key: "period_frames".into(),
            value: OscType::Float(256.0),
        }
        .encode();
        assert_eq!(msg.addr, "/rnbo/jack/config/period_frames");
        assert_eq!(msg.type_tags(), ",f");
    }

    #[test]
    fn test_to_bytes_decodes_back() {
        let cmd = Command::ConnectPorts {
            source: "system:capture_1".into(),
            sink: "rnbo-0:in1".into(),
        };
        let packet = osc::decode(&cmd.to_bytes()).unwrap();
        assert_eq!(packet, osc::OscPacket::Message(cmd.encode()));
    }
}
