//! Leaf value updates.
//!
//! One address, one mutation. Snapshot leaves are routed here too, so a
//! value reads the same whether it arrived in a dump or as a live message.

use super::address::{InstancePath, ParamLeaf, RunnerAddress};
use super::{Requests, SyncRequest, Synchronizer};
use crate::model::ParameterRecord;
use crate::osc::{self, DecodeOptions, OscMessage, OscType};

fn first_f64(msg: &OscMessage) -> Option<f64> {
    msg.first_arg().and_then(OscType::as_f64)
}

fn first_str(msg: &OscMessage) -> Option<&str> {
    msg.first_arg().and_then(OscType::as_str)
}

fn first_bool(msg: &OscMessage) -> Option<bool> {
    msg.first_arg().and_then(|arg| match arg {
        OscType::Float(_) | OscType::Double(_) => arg.as_f64().map(|v| v != 0.0),
        other => other.as_bool(),
    })
}

impl Synchronizer {
    pub(super) fn apply_leaf(&mut self, msg: &OscMessage, requests: &mut Requests) {
        let address = RunnerAddress::parse(&msg.addr);
        self.apply_leaf_at(&address, msg, requests);
    }

    pub(super) fn apply_leaf_at(
        &mut self,
        address: &RunnerAddress,
        msg: &OscMessage,
        requests: &mut Requests,
    ) {
        match address {
            RunnerAddress::Instance(index, path) => {
                self.apply_instance_leaf(*index, path, msg, requests);
            }
            RunnerAddress::PortInventory(spec) => {
                self.model.set_port_inventory(*spec, msg.string_args());
            }
            RunnerAddress::PortAliases(port) => {
                self.model.set_port_aliases(port, msg.string_args());
            }
            RunnerAddress::PortProperties(port) => {
                if let Some(json) = first_str(msg) {
                    self.model.set_port_properties(port, json);
                }
            }
            RunnerAddress::SystemPortLinks { port, .. } => {
                self.model.set_port_links(port, msg.string_args());
            }
            RunnerAddress::TransportBpm => {
                if let Some(bpm) = first_f64(msg) {
                    self.model.transport_mut().bpm = bpm;
                }
            }
            RunnerAddress::TransportRolling => {
                if let Some(rolling) = first_bool(msg) {
                    self.model.transport_mut().rolling = rolling;
                }
            }
            RunnerAddress::TransportSync => {
                if let Some(sync) = first_bool(msg) {
                    self.model.transport_mut().sync = sync;
                }
            }
            RunnerAddress::RunnerInfo(key) => {
                if let Some(value) = first_f64(msg) {
                    self.model.runner_mut().set_info_value(*key, &msg.addr, value);
                }
            }
            RunnerAddress::RecordingActive => {
                if let Some(active) = first_bool(msg) {
                    log::info!("[Sync] Recording {}", if active { "started" } else { "stopped" });
                    self.model.runner_mut().recording.active = active;
                }
            }
            RunnerAddress::RecordingCaptured => {
                if let Some(seconds) = first_f64(msg) {
                    self.model.runner_mut().recording.captured_seconds = seconds;
                }
            }
            RunnerAddress::ConfigValue { scope, key } => {
                let value = osc::args_value(&msg.args, DecodeOptions::default());
                self.model.runner_mut().set_config_value(*scope, key, value);
            }
            RunnerAddress::SetList => {
                // The value is only the last load argument. The set names
                // live in the leaf's range and arrive with snapshots.
                log::trace!("[Sync] Set load echo {:?}", first_str(msg));
            }
            RunnerAddress::SetCurrentName => {
                let name = first_str(msg).unwrap_or_default();
                log::info!("[Sync] Current set: {:?}", name);
                self.model.sets_mut().set_current(name);
            }
            RunnerAddress::SetCurrentDirty => {
                if let Some(dirty) = first_bool(msg) {
                    self.model.sets_mut().set_dirty(dirty);
                }
            }
            RunnerAddress::SetInitial => {
                self.model
                    .sets_mut()
                    .set_initial(first_str(msg).unwrap_or_default());
            }
            RunnerAddress::SetViewName(id) => {
                self.model.sets_mut().view_entry(*id).name =
                    first_str(msg).unwrap_or_default().to_string();
            }
            RunnerAddress::SetViewParams(id) => {
                self.model
                    .sets_mut()
                    .view_entry(*id)
                    .set_params_from_entries(&msg.string_args());
            }
            RunnerAddress::SetViewOrder => {
                let order: Vec<u32> = msg
                    .args
                    .iter()
                    .filter_map(|arg| match arg {
                        OscType::String(s) => s.parse().ok(),
                        other => other.as_f64().filter(|v| *v >= 0.0).map(|v| v as u32),
                    })
                    .collect();
                self.model.sets_mut().set_view_order(order);
            }
            _ => log::trace!("[Sync] Unhandled address {}", msg.addr),
        }
    }

    fn apply_instance_leaf(
        &mut self,
        index: u32,
        path: &InstancePath,
        msg: &OscMessage,
        requests: &mut Requests,
    ) {
        let Some(instance) = self.model.instance(index) else {
            log::debug!("[Sync] {} for unknown instance {} ignored", msg.addr, index);
            return;
        };
        let instance_path = instance.path.clone();
        let jack_name = instance.jack_name.clone();

        match path {
            InstancePath::Param { name, leaf } => {
                let param_path = format!("{instance_path}/params/{name}");
                let Some(param) = self.model.parameter_by_path_mut(&param_path) else {
                    log::debug!("[Sync] Unknown parameter {}", param_path);
                    return;
                };
                apply_param_leaf(param, *leaf, msg);
            }
            InstancePath::PortLinks { port, .. } => {
                self.model
                    .set_port_links(&format!("{jack_name}:{port}"), msg.string_args());
            }
            InstancePath::PortList(spec) => {
                self.model
                    .set_instance_port_list(index, *spec, msg.string_args());
            }
            InstancePath::JackName => {
                if first_str(msg).is_some_and(|name| name != jack_name) {
                    // The node id changes; rebuild from a fresh subtree.
                    requests.push(SyncRequest::now(instance_path));
                }
            }
            InstancePath::PatcherName => {
                if let (Some(name), Some(instance)) = (first_str(msg), self.model.instance_mut(index)) {
                    instance.patcher = name.to_string();
                }
            }
            InstancePath::Alias => {
                if let Some(instance) = self.model.instance_mut(index) {
                    instance.name_alias = first_str(msg).unwrap_or_default().to_string();
                }
            }
            InstancePath::PresetEntries => {
                if let Some(instance) = self.model.instance_mut(index) {
                    instance.set_preset_entries(&msg.string_args());
                }
            }
            InstancePath::PresetLoaded => {
                if let Some(instance) = self.model.instance_mut(index) {
                    instance.set_loaded_preset(first_str(msg).unwrap_or_default());
                }
            }
            InstancePath::PresetInitial => {
                if let Some(instance) = self.model.instance_mut(index) {
                    instance.set_initial_preset(first_str(msg).unwrap_or_default());
                }
            }
            InstancePath::MessageOut(tag) if !tag.is_empty() => {
                let value = osc::args_value(&msg.args, DecodeOptions::default());
                if let Some(instance) = self.model.instance_mut(index) {
                    instance.set_outport_value(tag, value);
                }
            }
            InstancePath::DataRef(name) => {
                let file = first_str(msg).unwrap_or_default();
                if let Some(instance) = self.model.instance_mut(index) {
                    if !instance.set_data_ref_file(name, file) {
                        log::debug!("[Sync] Unknown buffer {} on instance {}", name, index);
                    }
                }
            }
            InstancePath::DataRefMeta(name) => {
                let meta = first_str(msg).unwrap_or_default();
                if let Some(instance) = self.model.instance_mut(index) {
                    instance.set_data_ref_meta(name, meta);
                }
            }
            _ => log::trace!("[Sync] Unhandled instance address {}", msg.addr),
        }
    }
}

/// Remote updates always win over a provisional local edit.
fn apply_param_leaf(param: &mut ParameterRecord, leaf: ParamLeaf, msg: &OscMessage) {
    match leaf {
        ParamLeaf::Value => match msg.first_arg() {
            Some(OscType::String(name)) => {
                if !param.apply_enum_value(name) {
                    log::debug!("[Sync] {}: unknown enum value {:?}", param.path, name);
                }
            }
            Some(arg) => {
                if let Some(value) = arg.as_f64() {
                    param.apply_value(value);
                }
            }
            None => {}
        },
        ParamLeaf::Normalized => {
            if let Some(normalized) = first_f64(msg) {
                param.apply_normalized(normalized);
            }
        }
        ParamLeaf::Meta => param.apply_meta(first_str(msg).unwrap_or_default()),
        ParamLeaf::DisplayName => {
            param.display_name = first_str(msg).unwrap_or_default().to_string();
        }
        ParamLeaf::Index => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_leaf_clears_provisional() {
        let mut param = ParameterRecord::new(0, 0, "gain", "/rnbo/inst/0/params/gain", 0.0, 10.0);
        param.set_provisional_normalized(0.9);
        assert!(param.provisional);

        let msg = OscMessage::new("/rnbo/inst/0/params/gain", vec![OscType::Float(2.5)]);
        apply_param_leaf(&mut param, ParamLeaf::Value, &msg);
        assert!(!param.provisional);
        assert_eq!(param.value, 2.5);
        assert_eq!(param.normalized, 0.25);
    }

    #[test]
    fn test_enum_leaf_by_name() {
        let mut param = ParameterRecord::new(0, 0, "mode", "/rnbo/inst/0/params/mode", 0.0, 1.0);
        param.enum_values = vec!["off".into(), "on".into()];
        let msg = OscMessage::new("/rnbo/inst/0/params/mode", vec![OscType::String("on".into())]);
        apply_param_leaf(&mut param, ParamLeaf::Value, &msg);
        assert_eq!(param.value, 1.0);
        assert_eq!(param.value_label(), "on");
    }

    #[test]
    fn test_first_bool_accepts_numbers() {
        let msg = OscMessage::new("/x", vec![OscType::Float(1.0)]);
        assert_eq!(first_bool(&msg), Some(true));
        let msg = OscMessage::new("/x", vec![OscType::Bool(false)]);
        assert_eq!(first_bool(&msg), Some(false));
    }
}
