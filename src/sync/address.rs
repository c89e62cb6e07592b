//! Segment-based matching of runner addresses.
//!
//! Every address the synchronizer understands maps to one [`RunnerAddress`].
//! Matching works on whole `/`-separated segments, so `/rnbo/inst/1` never
//! matches `/rnbo/inst/10`.

use crate::model::{ConfigScope, ConnectionType, PortDirection, PortSpec, RunnerInfoKey};

/// Field of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLeaf {
    /// The value itself.
    Value,
    /// `…/normalized`.
    Normalized,
    /// `…/meta`.
    Meta,
    /// `…/display_name`.
    DisplayName,
    /// `…/index`.
    Index,
}

impl ParamLeaf {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "normalized" => Some(Self::Normalized),
            "meta" => Some(Self::Meta),
            "display_name" => Some(Self::DisplayName),
            "index" => Some(Self::Index),
            _ => None,
        }
    }
}

/// Address below `/rnbo/inst/<n>`.
#[derive(Debug, Clone, PartialEq)]
pub enum InstancePath {
    /// The instance container itself.
    Root,
    /// `name`: the patcher the instance runs.
    PatcherName,
    /// `config/name_alias`.
    Alias,
    /// `jack/name`.
    JackName,
    /// `jack/{audio_ins,audio_outs,midi_ins,midi_outs}`.
    PortList(PortSpec),
    /// `jack/connections` or one of its inner containers.
    Connections,
    /// `jack/connections/<type>/<sources|sinks>/<port>`.
    PortLinks {
        /// Signal kind.
        connection_type: ConnectionType,
        /// Side of the instance the port is on.
        direction: PortDirection,
        /// Port name without the client prefix.
        port: String,
    },
    /// `params`.
    Params,
    /// `params/<name…>[/<leaf>]`.
    Param {
        /// Name relative to `params`.
        name: String,
        /// Which field.
        leaf: ParamLeaf,
    },
    /// `presets`.
    Presets,
    /// `presets/entries`.
    PresetEntries,
    /// `presets/loaded`.
    PresetLoaded,
    /// `presets/initial`.
    PresetInitial,
    /// `messages`, `messages/in` or `messages/out`.
    Messages,
    /// `messages/in/<tag…>`.
    MessageIn(String),
    /// `messages/out/<tag…>`.
    MessageOut(String),
    /// `data_refs`.
    DataRefs,
    /// `data_refs/<name>`: the mapped file.
    DataRef(String),
    /// `data_refs/<name>/meta`.
    DataRefMeta(String),
    /// Anything else under the instance.
    Other,
}

/// A recognized runner address.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerAddress {
    /// `/rnbo`.
    Root,
    /// `/rnbo/patchers`.
    Patchers,
    /// `/rnbo/patchers/<name>` and anything below it.
    Patcher(String),
    /// `/rnbo/jack/info`.
    JackInfo,
    /// `/rnbo/jack/info/<cpu_load|xrun_count>`.
    RunnerInfo(RunnerInfoKey),
    /// `/rnbo/jack/info/ports`.
    JackPorts,
    /// `/rnbo/jack/info/ports/<type>/<sinks|sources>`.
    PortInventory(PortSpec),
    /// `/rnbo/jack/info/ports/aliases`.
    PortAliasesRoot,
    /// `/rnbo/jack/info/ports/aliases/<port>`.
    PortAliases(String),
    /// `/rnbo/jack/info/ports/properties`.
    PortPropertiesRoot,
    /// `/rnbo/jack/info/ports/properties/<port>`.
    PortProperties(String),
    /// `/rnbo/jack/connections` or `/rnbo/jack/connections/<type>`.
    JackConnections,
    /// `/rnbo/jack/connections/<type>/<port>`.
    SystemPortLinks {
        /// Signal kind.
        connection_type: ConnectionType,
        /// Full port name.
        port: String,
    },
    /// `/rnbo/jack/transport`.
    Transport,
    /// `/rnbo/jack/transport/bpm`.
    TransportBpm,
    /// `/rnbo/jack/transport/rolling`.
    TransportRolling,
    /// `/rnbo/jack/transport/sync`.
    TransportSync,
    /// `/rnbo/jack/record`.
    Recording,
    /// `/rnbo/jack/record/active`.
    RecordingActive,
    /// `/rnbo/jack/record/captured`: seconds in the current take.
    RecordingCaptured,
    /// `/rnbo/config`, `/rnbo/jack/config` or `/rnbo/inst/config`.
    Config(ConfigScope),
    /// A value below one of the configuration containers.
    ConfigValue {
        /// Which tree.
        scope: ConfigScope,
        /// Key relative to the container.
        key: String,
    },
    /// `/rnbo/inst`.
    Instances,
    /// `/rnbo/inst/<n>/…`.
    Instance(u32, InstancePath),
    /// `/rnbo/inst/control/sets`.
    Sets,
    /// `/rnbo/inst/control/sets/load`: the set list lives in its range.
    SetList,
    /// `/rnbo/inst/control/sets/initial`.
    SetInitial,
    /// `/rnbo/inst/control/sets/current` container.
    SetCurrent,
    /// `/rnbo/inst/control/sets/current/name`.
    SetCurrentName,
    /// `/rnbo/inst/control/sets/current/dirty`.
    SetCurrentDirty,
    /// `/rnbo/inst/control/sets/views` or `…/views/list`.
    SetViews,
    /// `/rnbo/inst/control/sets/views/list/<id>`.
    SetView(u32),
    /// `/rnbo/inst/control/sets/views/list/<id>/name`.
    SetViewName(u32),
    /// `/rnbo/inst/control/sets/views/list/<id>/params`.
    SetViewParams(u32),
    /// `/rnbo/inst/control/sets/views/order`.
    SetViewOrder,
    /// Not something the model mirrors.
    Other,
}

fn index_segment(segment: &str) -> Option<u32> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

fn inventory_spec(kind: &str, side: &str) -> Option<PortSpec> {
    let connection_type = ConnectionType::parse(kind)?;
    let direction = match side {
        "sinks" => PortDirection::Sink,
        "sources" => PortDirection::Source,
        _ => return None,
    };
    Some(PortSpec {
        direction,
        connection_type,
    })
}

fn io_list_spec(segment: &str) -> Option<PortSpec> {
    let (connection_type, direction) = match segment {
        "audio_ins" => (ConnectionType::Audio, PortDirection::Sink),
        "audio_outs" => (ConnectionType::Audio, PortDirection::Source),
        "midi_ins" => (ConnectionType::Midi, PortDirection::Sink),
        "midi_outs" => (ConnectionType::Midi, PortDirection::Source),
        _ => return None,
    };
    Some(PortSpec {
        direction,
        connection_type,
    })
}

impl RunnerAddress {
    /// Classify an absolute address.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            ["rnbo"] => Self::Root,
            ["rnbo", "config", key @ ..] => Self::config(ConfigScope::Runner, key),
            ["rnbo", "patchers"] => Self::Patchers,
            ["rnbo", "patchers", name, ..] => Self::Patcher((*name).to_string()),
            ["rnbo", "jack", rest @ ..] => Self::parse_jack(rest),
            ["rnbo", "inst"] => Self::Instances,
            ["rnbo", "inst", "config", key @ ..] => Self::config(ConfigScope::Instances, key),
            ["rnbo", "inst", "control", "sets", rest @ ..] => Self::parse_sets(rest),
            ["rnbo", "inst", id, rest @ ..] => match index_segment(id) {
                Some(index) => Self::Instance(index, InstancePath::parse(rest)),
                None => Self::Other,
            },
            _ => Self::Other,
        }
    }

    fn config(scope: ConfigScope, key: &[&str]) -> Self {
        if key.is_empty() {
            Self::Config(scope)
        } else {
            Self::ConfigValue {
                scope,
                key: key.join("/"),
            }
        }
    }

    fn parse_jack(rest: &[&str]) -> Self {
        match rest {
            ["info"] => Self::JackInfo,
            ["info", "ports"] => Self::JackPorts,
            ["info", "ports", "aliases"] => Self::PortAliasesRoot,
            ["info", "ports", "aliases", port @ ..] => Self::PortAliases(port.join("/")),
            ["info", "ports", "properties"] => Self::PortPropertiesRoot,
            ["info", "ports", "properties", port @ ..] => Self::PortProperties(port.join("/")),
            ["info", "ports", kind, side] => {
                inventory_spec(kind, side).map_or(Self::Other, Self::PortInventory)
            }
            ["info", key] => RunnerInfoKey::from_segment(key).map_or(Self::Other, Self::RunnerInfo),
            ["config", key @ ..] => Self::config(ConfigScope::Jack, key),
            ["connections"] => Self::JackConnections,
            ["connections", kind] if ConnectionType::parse(kind).is_some() => Self::JackConnections,
            ["connections", kind, port @ ..] => match ConnectionType::parse(kind) {
                Some(connection_type) => Self::SystemPortLinks {
                    connection_type,
                    port: port.join("/"),
                },
                None => Self::Other,
            },
            ["transport"] => Self::Transport,
            ["transport", "bpm"] => Self::TransportBpm,
            ["transport", "rolling"] => Self::TransportRolling,
            ["transport", "sync"] => Self::TransportSync,
            ["record"] => Self::Recording,
            ["record", "active"] => Self::RecordingActive,
            ["record", "captured"] => Self::RecordingCaptured,
            _ => Self::Other,
        }
    }

    fn parse_sets(rest: &[&str]) -> Self {
        match rest {
            [] => Self::Sets,
            ["load"] => Self::SetList,
            ["initial"] => Self::SetInitial,
            ["current"] => Self::SetCurrent,
            ["current", "name"] => Self::SetCurrentName,
            ["current", "dirty"] => Self::SetCurrentDirty,
            ["views"] | ["views", "list"] => Self::SetViews,
            ["views", "order"] => Self::SetViewOrder,
            ["views", "list", id, tail @ ..] => match (index_segment(id), tail) {
                (Some(id), []) => Self::SetView(id),
                (Some(id), ["name"]) => Self::SetViewName(id),
                (Some(id), ["params"]) => Self::SetViewParams(id),
                _ => Self::Other,
            },
            _ => Self::Other,
        }
    }
}

impl InstancePath {
    fn parse(rest: &[&str]) -> Self {
        match rest {
            [] => Self::Root,
            ["name"] => Self::PatcherName,
            ["config", "name_alias"] => Self::Alias,
            ["jack", "name"] => Self::JackName,
            ["jack", "connections", kind, side, port @ ..] if !port.is_empty() => {
                match inventory_spec(kind, side) {
                    Some(spec) => Self::PortLinks {
                        connection_type: spec.connection_type,
                        direction: spec.direction,
                        port: port.join("/"),
                    },
                    None => Self::Other,
                }
            }
            ["jack", "connections", ..] => Self::Connections,
            ["jack", list] => io_list_spec(list).map_or(Self::Other, Self::PortList),
            ["params"] => Self::Params,
            ["params", name @ ..] => Self::parse_param(name),
            ["presets"] => Self::Presets,
            ["presets", "entries"] => Self::PresetEntries,
            ["presets", "loaded"] => Self::PresetLoaded,
            ["presets", "initial"] => Self::PresetInitial,
            ["messages"] | ["messages", "in" | "out"] => Self::Messages,
            ["messages", "in", tag @ ..] => Self::MessageIn(tag.join("/")),
            ["messages", "out", tag @ ..] => Self::MessageOut(tag.join("/")),
            ["data_refs"] => Self::DataRefs,
            ["data_refs", name] => Self::DataRef((*name).to_string()),
            ["data_refs", name, "meta"] => Self::DataRefMeta((*name).to_string()),
            _ => Self::Other,
        }
    }

    fn parse_param(name: &[&str]) -> Self {
        if let [base @ .., last] = name {
            if !base.is_empty() {
                if let Some(leaf) = ParamLeaf::from_segment(last) {
                    return Self::Param {
                        name: base.join("/"),
                        leaf,
                    };
                }
            }
        }
        Self::Param {
            name: name.join("/"),
            leaf: ParamLeaf::Value,
        }
    }
}
