//! `PATH_ADDED` / `PATH_REMOVED` handling.
//!
//! Additions carry only a path, so they turn into state requests for the
//! smallest subtree that rebuilds the affected entity. Removals of whole
//! entities are applied directly; anything finer is re-requested.

use super::address::{InstancePath, ParamLeaf, RunnerAddress};
use super::{Requests, SyncRequest, Synchronizer};
use crate::constants::{
    JACK_CONNECTIONS_PATH, JACK_INFO_PATH, JACK_PORTS_PATH, JACK_RECORD_PATH,
    JACK_TRANSPORT_PATH, PATCHERS_PATH, SETS_PATH,
};

/// Subtree that refreshes whatever `address` belongs to, outside instances.
fn refresh_path(address: &RunnerAddress) -> Option<&'static str> {
    match address {
        RunnerAddress::Patchers | RunnerAddress::Patcher(_) => Some(PATCHERS_PATH),
        RunnerAddress::JackPorts
        | RunnerAddress::PortInventory(_)
        | RunnerAddress::PortAliasesRoot
        | RunnerAddress::PortAliases(_)
        | RunnerAddress::PortPropertiesRoot
        | RunnerAddress::PortProperties(_) => Some(JACK_PORTS_PATH),
        RunnerAddress::JackInfo | RunnerAddress::RunnerInfo(_) => Some(JACK_INFO_PATH),
        RunnerAddress::Recording
        | RunnerAddress::RecordingActive
        | RunnerAddress::RecordingCaptured => Some(JACK_RECORD_PATH),
        RunnerAddress::Config(scope) | RunnerAddress::ConfigValue { scope, .. } => {
            Some(scope.path())
        }
        RunnerAddress::JackConnections | RunnerAddress::SystemPortLinks { .. } => {
            Some(JACK_CONNECTIONS_PATH)
        }
        RunnerAddress::Transport
        | RunnerAddress::TransportBpm
        | RunnerAddress::TransportRolling
        | RunnerAddress::TransportSync => Some(JACK_TRANSPORT_PATH),
        RunnerAddress::Sets
        | RunnerAddress::SetList
        | RunnerAddress::SetInitial
        | RunnerAddress::SetCurrent
        | RunnerAddress::SetCurrentName
        | RunnerAddress::SetCurrentDirty
        | RunnerAddress::SetViews
        | RunnerAddress::SetView(_)
        | RunnerAddress::SetViewName(_)
        | RunnerAddress::SetViewParams(_)
        | RunnerAddress::SetViewOrder => Some(SETS_PATH),
        _ => None,
    }
}

/// Instance subtree that refreshes whatever `path` belongs to.
fn instance_refresh_suffix(path: &InstancePath) -> Option<&'static str> {
    match path {
        InstancePath::Params | InstancePath::Param { .. } => Some("params"),
        InstancePath::Presets
        | InstancePath::PresetEntries
        | InstancePath::PresetLoaded
        | InstancePath::PresetInitial => Some("presets"),
        InstancePath::Messages | InstancePath::MessageIn(_) | InstancePath::MessageOut(_) => {
            Some("messages")
        }
        InstancePath::DataRefs | InstancePath::DataRef(_) | InstancePath::DataRefMeta(_) => {
            Some("data_refs")
        }
        InstancePath::JackName
        | InstancePath::PortList(_)
        | InstancePath::Connections
        | InstancePath::PortLinks { .. } => Some("jack"),
        _ => None,
    }
}

impl Synchronizer {
    /// Handle a `PATH_ADDED` event.
    pub fn path_added(&mut self, path: &str) -> Vec<SyncRequest> {
        let mut requests = Requests::default();
        let address = RunnerAddress::parse(path);
        log::debug!("[Sync] Path added: {}", path);

        match &address {
            RunnerAddress::Instance(index, InstancePath::Root) => {
                // The runner announces the instance before its ports are wired.
                log::info!("[Sync] Instance {} added", index);
                requests.push(SyncRequest::after(path, self.instance_add_delay));
            }
            RunnerAddress::Instance(index, sub) => {
                let Some(instance) = self.model.instance(*index) else {
                    log::debug!("[Sync] Addition under unknown instance {} ignored", index);
                    return Vec::new();
                };
                if let Some(suffix) = instance_refresh_suffix(sub) {
                    requests.push(SyncRequest::now(format!("{}/{suffix}", instance.path)));
                }
            }
            other => {
                if let Some(refresh) = refresh_path(other) {
                    requests.push(SyncRequest::now(refresh));
                }
            }
        }
        requests.into_vec()
    }

    /// Handle a `PATH_REMOVED` event.
    pub fn path_removed(&mut self, path: &str) -> Vec<SyncRequest> {
        let mut requests = Requests::default();
        let address = RunnerAddress::parse(path);
        log::debug!("[Sync] Path removed: {}", path);

        match &address {
            RunnerAddress::Instance(index, InstancePath::Root) => {
                if self.model.remove_instance(*index).is_some() {
                    log::info!("[Sync] Instance {} removed", index);
                }
            }
            RunnerAddress::Patcher(name)
                if path.trim_end_matches('/') == format!("{PATCHERS_PATH}/{name}") =>
            {
                self.model.remove_patcher(name);
            }
            RunnerAddress::SetView(id) => {
                self.model.sets_mut().remove_view(*id);
            }
            RunnerAddress::PortAliases(port) | RunnerAddress::PortProperties(port) => {
                self.model.forget_port_metadata(port);
            }
            RunnerAddress::SystemPortLinks { port, .. } => {
                self.model.set_port_links(port, Vec::new());
            }
            RunnerAddress::ConfigValue { scope, key } => {
                self.model.runner_mut().remove_config(*scope, key);
            }
            RunnerAddress::Instance(index, sub) => {
                let Some(instance) = self.model.instance(*index) else {
                    return Vec::new();
                };
                let instance_path = instance.path.clone();
                match sub {
                    InstancePath::Params => self.model.replace_parameters(*index, Vec::new()),
                    InstancePath::Param {
                        name,
                        leaf: ParamLeaf::Value,
                    } => {
                        let param_path = format!("{instance_path}/params/{name}");
                        if self.model.remove_parameter_by_path(&param_path).is_none() {
                            // Possibly a container of polyphonic voices.
                            requests.push(SyncRequest::now(format!("{instance_path}/params")));
                        }
                    }
                    InstancePath::MessageIn(tag) => {
                        if let Some(instance) = self.model.instance_mut(*index) {
                            instance.inports.remove(tag);
                        }
                    }
                    InstancePath::MessageOut(tag) => {
                        if let Some(instance) = self.model.instance_mut(*index) {
                            instance.outports.remove(tag);
                        }
                    }
                    InstancePath::DataRef(name) => {
                        if let Some(instance) = self.model.instance_mut(*index) {
                            instance.data_refs.remove(name);
                        }
                    }
                    other => {
                        if let Some(suffix) = instance_refresh_suffix(other) {
                            requests.push(SyncRequest::now(format!("{instance_path}/{suffix}")));
                        }
                    }
                }
            }
            other => {
                if let Some(refresh) = refresh_path(other) {
                    requests.push(SyncRequest::now(refresh));
                }
            }
        }
        requests.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_instance_added_is_delayed() {
        let mut sync = Synchronizer::new(Duration::from_millis(250));
        let requests = sync.path_added("/rnbo/inst/3");
        assert_eq!(
            requests,
            vec![SyncRequest::after("/rnbo/inst/3", Duration::from_millis(250))]
        );
    }

    #[test]
    fn test_addition_under_unknown_instance_ignored() {
        let mut sync = Synchronizer::default();
        assert!(sync.path_added("/rnbo/inst/0/params/gain").is_empty());
    }

    #[test]
    fn test_set_paths_refresh_sets() {
        let mut sync = Synchronizer::default();
        assert_eq!(
            sync.path_added("/rnbo/inst/control/sets/views/list/4"),
            vec![SyncRequest::now(SETS_PATH)]
        );
        assert_eq!(
            sync.path_removed("/rnbo/inst/control/sets/load"),
            vec![SyncRequest::now(SETS_PATH)]
        );
    }

    #[test]
    fn test_patcher_added_refreshes_list() {
        let mut sync = Synchronizer::default();
        assert_eq!(
            sync.path_added("/rnbo/patchers/new-synth"),
            vec![SyncRequest::now(PATCHERS_PATH)]
        );
    }

    #[test]
    fn test_runner_level_paths_refresh_their_container() {
        let mut sync = Synchronizer::default();
        assert_eq!(
            sync.path_added("/rnbo/jack/info/cpu_load"),
            vec![SyncRequest::now(JACK_INFO_PATH)]
        );
        assert_eq!(
            sync.path_added("/rnbo/jack/record/captured"),
            vec![SyncRequest::now(JACK_RECORD_PATH)]
        );
        assert_eq!(
            sync.path_added("/rnbo/jack/config/sample_rate"),
            vec![SyncRequest::now("/rnbo/jack/config")]
        );
    }
}
