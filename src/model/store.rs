//! The domain model: single owner of every synchronized entity.
//!
//! The runner describes ports and links from several angles (a system-wide
//! port inventory, per-instance port lists, per-port connection lists from
//! both ends), in any order. The store keeps those raw reports and derives
//! system nodes and connections from them, so a report that arrives before
//! the entity it refers to is held until it resolves instead of being lost.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;

use super::error::ConnectionError;
use super::graph::{
    ConnectionType, Graph, GraphNode, GraphPort, NodeType, PortDirection,
    PortId, PortProperties,
};
use super::instance::{InstanceRecord, PatcherRecord, RunnerTransport};
use super::parameter::{ParameterKey, ParameterRecord};
use super::runner::RunnerState;
use super::sets::SetCollection;
use crate::constants::{SYSTEM_CLIENT, SYSTEM_INPUT_NODE, SYSTEM_OUTPUT_NODE};

/// A port as listed in the runner's port inventory or an instance's io lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortSpec {
    /// Signal direction.
    pub direction: PortDirection,
    /// Signal kind.
    pub connection_type: ConnectionType,
}

/// The in-memory mirror of the runner.
#[derive(Debug, Clone, Default)]
pub struct GraphModel {
    graph: Graph,
    instances: BTreeMap<u32, InstanceRecord>,
    parameters: BTreeMap<ParameterKey, ParameterRecord>,
    parameter_paths: HashMap<String, ParameterKey>,
    patchers: BTreeMap<String, PatcherRecord>,
    sets: SetCollection,
    transport: RunnerTransport,
    runner: RunnerState,

    /// Inventory: full port name → spec, per (type, direction) list.
    port_inventory: HashMap<(ConnectionType, PortDirection), BTreeSet<String>>,
    /// Instance io lists: instance → full port names with their spec.
    instance_ports: HashMap<u32, BTreeMap<String, PortSpec>>,
    port_aliases: HashMap<String, BTreeSet<String>>,
    port_properties: HashMap<String, PortProperties>,
    /// Latest peer list reported for each full port name.
    links: BTreeMap<String, BTreeSet<String>>,
}

impl GraphModel {
    /// Empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    /// The node/port/connection graph.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Instance by index.
    #[must_use]
    pub fn instance(&self, index: u32) -> Option<&InstanceRecord> {
        self.instances.get(&index)
    }

    /// All instances, ordered by index.
    pub fn instances(&self) -> impl Iterator<Item = &InstanceRecord> {
        self.instances.values()
    }

    /// Parameter by key.
    #[must_use]
    pub fn parameter(&self, key: ParameterKey) -> Option<&ParameterRecord> {
        self.parameters.get(&key)
    }

    /// Parameter by the full path of its value leaf.
    #[must_use]
    pub fn parameter_by_path(&self, path: &str) -> Option<&ParameterRecord> {
        self.parameter_paths
            .get(path)
            .and_then(|key| self.parameters.get(key))
    }

    /// Parameters of one instance, ordered by index.
    pub fn instance_parameters(&self, instance: u32) -> impl Iterator<Item = &ParameterRecord> {
        self.parameters
            .range(ParameterKey::new(instance, 0)..=ParameterKey::new(instance, u32::MAX))
            .map(|(_, p)| p)
    }

    /// All parameters.
    pub fn parameters(&self) -> impl Iterator<Item = &ParameterRecord> {
        self.parameters.values()
    }

    /// Patcher by name.
    #[must_use]
    pub fn patcher(&self, name: &str) -> Option<&PatcherRecord> {
        self.patchers.get(name)
    }

    /// All patchers, ordered by name.
    pub fn patchers(&self) -> impl Iterator<Item = &PatcherRecord> {
        self.patchers.values()
    }

    /// Sets and set views.
    #[must_use]
    pub fn sets(&self) -> &SetCollection {
        &self.sets
    }

    /// Currently loaded set.
    #[must_use]
    pub fn current_graph_set_id(&self) -> Option<&str> {
        self.sets.current()
    }

    /// Runner transport state.
    #[must_use]
    pub fn transport(&self) -> &RunnerTransport {
        &self.transport
    }

    /// Load statistics, recorder and configuration.
    #[must_use]
    pub fn runner(&self) -> &RunnerState {
        &self.runner
    }

    /// Check a proposed connection without changing anything.
    ///
    /// # Errors
    ///
    /// See [`Graph::validate_connection`].
    pub fn validate_connection(
        &self,
        source: &str,
        sink: &str,
    ) -> Result<ConnectionType, ConnectionError> {
        self.graph.validate_connection(source, sink)
    }

    // ------------------------------------------------------------------
    // Patchers, sets, runner state
    // ------------------------------------------------------------------

    /// Replace the patcher list.
    pub fn set_patchers(&mut self, patchers: impl IntoIterator<Item = PatcherRecord>) {
        self.patchers = patchers.into_iter().map(|p| (p.name.clone(), p)).collect();
    }

    /// Insert or replace one patcher.
    pub fn upsert_patcher(&mut self, patcher: PatcherRecord) {
        self.patchers.insert(patcher.name.clone(), patcher);
    }

    /// Remove one patcher.
    pub fn remove_patcher(&mut self, name: &str) -> bool {
        self.patchers.remove(name).is_some()
    }

    /// Mutable sets and set views.
    pub fn sets_mut(&mut self) -> &mut SetCollection {
        &mut self.sets
    }

    /// Mutable runner transport state.
    pub fn transport_mut(&mut self) -> &mut RunnerTransport {
        &mut self.transport
    }

    /// Mutable runner-wide state.
    pub fn runner_mut(&mut self) -> &mut RunnerState {
        &mut self.runner
    }

    // ------------------------------------------------------------------
    // Instances and parameters
    // ------------------------------------------------------------------

    /// Insert or replace an instance with its ports and parameters.
    ///
    /// `ports` maps full port names to their spec. Parameters previously held
    /// for this instance are replaced.
    pub fn upsert_instance(
        &mut self,
        record: InstanceRecord,
        ports: BTreeMap<String, PortSpec>,
        parameters: Vec<ParameterRecord>,
    ) {
        let index = record.index;
        if let Some(old) = self.instances.get(&index) {
            if old.jack_name != record.jack_name {
                let old_node = old.jack_name.clone();
                self.graph.remove_node(&old_node);
            }
        }

        self.graph
            .upsert_node(GraphNode::patcher(record.jack_name.clone(), index));
        self.instances.insert(index, record);
        self.instance_ports.insert(index, ports);
        self.replace_parameters(index, parameters);

        self.rebuild_instance_ports(index);
        self.rebuild_system_nodes();
        self.rebuild_connections();
    }

    /// Replace one io list of an instance.
    pub fn set_instance_port_list(
        &mut self,
        index: u32,
        spec: PortSpec,
        names: impl IntoIterator<Item = String>,
    ) {
        if !self.instances.contains_key(&index) {
            log::debug!("[Model] Port list for unknown instance {} ignored", index);
            return;
        }
        let ports = self.instance_ports.entry(index).or_default();
        ports.retain(|_, s| *s != spec);
        ports.extend(names.into_iter().map(|name| (name, spec)));

        self.rebuild_instance_ports(index);
        self.rebuild_system_nodes();
        self.rebuild_connections();
    }

    /// Remove an instance, its node, ports, connections, and parameters.
    pub fn remove_instance(&mut self, index: u32) -> Option<InstanceRecord> {
        let record = self.instances.remove(&index)?;
        self.graph.remove_node(record.node_id());
        if let Some(ports) = self.instance_ports.remove(&index) {
            for name in ports.keys() {
                self.links.remove(name);
            }
        }
        self.replace_parameters(index, Vec::new());
        self.sets.forget_instance(index);

        self.rebuild_system_nodes();
        self.rebuild_connections();
        log::debug!("[Model] Instance {} removed", index);
        Some(record)
    }

    /// Remove every instance not in `keep`.
    pub fn retain_instances(&mut self, keep: &HashSet<u32>) {
        let stale: Vec<u32> = self
            .instances
            .keys()
            .filter(|i| !keep.contains(i))
            .copied()
            .collect();
        for index in stale {
            self.remove_instance(index);
        }
    }

    /// Mutable instance access for metadata that does not affect the graph.
    pub fn instance_mut(&mut self, index: u32) -> Option<&mut InstanceRecord> {
        self.instances.get_mut(&index)
    }

    /// Insert or replace one parameter.
    pub fn upsert_parameter(&mut self, parameter: ParameterRecord) {
        let key = parameter.key();
        if let Some(old) = self.parameters.get(&key) {
            if old.path != parameter.path {
                self.parameter_paths.remove(&old.path);
            }
        }
        self.parameter_paths.insert(parameter.path.clone(), key);
        self.parameters.insert(key, parameter);
    }

    /// Remove the parameter whose value leaf is `path`.
    pub fn remove_parameter_by_path(&mut self, path: &str) -> Option<ParameterRecord> {
        let key = self.parameter_paths.remove(path)?;
        self.parameters.remove(&key)
    }

    /// Replace every parameter of one instance.
    pub fn replace_parameters(&mut self, instance: u32, parameters: Vec<ParameterRecord>) {
        let old: Vec<ParameterKey> = self
            .instance_parameters(instance)
            .map(ParameterRecord::key)
            .collect();
        for key in old {
            if let Some(p) = self.parameters.remove(&key) {
                self.parameter_paths.remove(&p.path);
            }
        }
        for parameter in parameters {
            self.upsert_parameter(parameter);
        }
    }

    /// Mutable parameter access by value-leaf path.
    pub fn parameter_by_path_mut(&mut self, path: &str) -> Option<&mut ParameterRecord> {
        let key = self.parameter_paths.get(path)?;
        self.parameters.get_mut(key)
    }

    /// Mutable parameter access by key.
    pub fn parameter_mut(&mut self, key: ParameterKey) -> Option<&mut ParameterRecord> {
        self.parameters.get_mut(&key)
    }

    // ------------------------------------------------------------------
    // System ports and links
    // ------------------------------------------------------------------

    /// Replace one list of the system-wide port inventory.
    pub fn set_port_inventory(
        &mut self,
        spec: PortSpec,
        names: impl IntoIterator<Item = String>,
    ) {
        self.port_inventory.insert(
            (spec.connection_type, spec.direction),
            names.into_iter().filter(|n| !n.is_empty()).collect(),
        );
        self.rebuild_system_nodes();
        self.rebuild_connections();
    }

    /// Replace the aliases of a port, by full name.
    pub fn set_port_aliases(&mut self, jack_name: &str, aliases: impl IntoIterator<Item = String>) {
        let aliases: BTreeSet<String> = aliases.into_iter().filter(|a| !a.is_empty()).collect();
        if let Some(id) = self.port_id_for(jack_name) {
            if let Some(port) = self.graph.port_mut(&id) {
                port.aliases.clone_from(&aliases);
            }
        }
        self.port_aliases.insert(jack_name.to_string(), aliases);
    }

    /// Replace the JSON property blob of a port, by full name.
    ///
    /// A port-group change can move a system port to another node.
    pub fn set_port_properties(&mut self, jack_name: &str, json: &str) {
        let props = PortProperties::parse(json);
        let regroup = self
            .port_properties
            .get(jack_name)
            .map(PortProperties::port_group)
            != Some(props.port_group());
        self.port_properties.insert(jack_name.to_string(), props);

        if regroup {
            self.rebuild_system_nodes();
            self.rebuild_connections();
        } else if let Some(id) = self.port_id_for(jack_name) {
            let props = self.port_properties.get(jack_name).cloned().unwrap_or_default();
            if let Some(port) = self.graph.port_mut(&id) {
                port.properties = props;
            }
        }
    }

    /// Forget aliases and properties of a port that went away.
    pub fn forget_port_metadata(&mut self, jack_name: &str) {
        self.port_aliases.remove(jack_name);
        self.port_properties.remove(jack_name);
        self.rebuild_system_nodes();
        self.rebuild_connections();
    }

    /// Replace the peer list reported for one port, by full names.
    ///
    /// Peers that do not resolve yet are kept and connected once they appear.
    pub fn set_port_links(&mut self, jack_name: &str, peers: impl IntoIterator<Item = String>) {
        let peers: BTreeSet<String> = peers.into_iter().filter(|p| !p.is_empty()).collect();
        if peers.is_empty() {
            self.links.remove(jack_name);
        } else {
            self.links.insert(jack_name.to_string(), peers);
        }
        self.rebuild_connections();
    }

    /// Drop every link report.
    pub fn clear_links(&mut self) {
        self.links.clear();
        self.rebuild_connections();
    }

    /// Graph port id for a full port name.
    #[must_use]
    pub fn port_id_for(&self, jack_name: &str) -> Option<PortId> {
        self.graph
            .port_by_jack_name(jack_name)
            .map(|p| p.id.clone())
    }

    /// Full port name for a graph port id.
    #[must_use]
    pub fn jack_name_for(&self, port_id: &str) -> Option<&str> {
        self.graph.port(port_id).map(|p| p.jack_name.as_str())
    }

    /// Drop all state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn decorate(&self, mut port: GraphPort) -> GraphPort {
        if let Some(aliases) = self.port_aliases.get(&port.jack_name) {
            port.aliases.clone_from(aliases);
        }
        if let Some(props) = self.port_properties.get(&port.jack_name) {
            port.properties = props.clone();
        }
        port
    }

    fn rebuild_instance_ports(&mut self, index: u32) {
        let Some(record) = self.instances.get(&index) else {
            return;
        };
        let node_id = record.jack_name.clone();
        let prefix = format!("{node_id}:");
        let desired: Vec<GraphPort> = self
            .instance_ports
            .get(&index)
            .into_iter()
            .flatten()
            .map(|(jack_name, spec)| {
                let name = jack_name.strip_prefix(&prefix).unwrap_or(jack_name);
                self.decorate(GraphPort::new(
                    &node_id,
                    name,
                    jack_name.clone(),
                    spec.direction,
                    spec.connection_type,
                ))
            })
            .collect();

        let keep: HashSet<&PortId> = desired.iter().map(|p| &p.id).collect();
        let stale: Vec<PortId> = self
            .graph
            .node_ports(&node_id)
            .filter(|p| !keep.contains(&p.id))
            .map(|p| p.id.clone())
            .collect();
        for id in stale {
            self.graph.remove_port(&id);
        }
        for port in desired {
            if let Err(e) = self.graph.upsert_port(port) {
                log::debug!("[Model] {}", e);
            }
        }
    }

    /// Derive system nodes and ports from the inventory.
    ///
    /// `system:*` ports land on `system-in` (sources) and `system-out`
    /// (sinks) unless a port group moves them to `<group>-in` / `<group>-out`.
    /// Ports of other clients appear only when they carry a port group;
    /// instance ports are owned by their instance node.
    fn rebuild_system_nodes(&mut self) {
        let mut desired: BTreeMap<String, Vec<GraphPort>> = BTreeMap::new();

        for ((connection_type, direction), names) in &self.port_inventory {
            for jack_name in names {
                let Some((client, short)) = jack_name.split_once(':') else {
                    continue;
                };
                let group = self
                    .port_properties
                    .get(jack_name)
                    .and_then(PortProperties::port_group);
                let group = match (group, client) {
                    (Some(group), _) => group,
                    (None, SYSTEM_CLIENT) => SYSTEM_CLIENT,
                    (None, _) => continue,
                };
                let node_id = match (group, direction) {
                    (SYSTEM_CLIENT, PortDirection::Source) => SYSTEM_INPUT_NODE.to_string(),
                    (SYSTEM_CLIENT, PortDirection::Sink) => SYSTEM_OUTPUT_NODE.to_string(),
                    (g, PortDirection::Source) => format!("{g}-in"),
                    (g, PortDirection::Sink) => format!("{g}-out"),
                };
                let name = if client == SYSTEM_CLIENT { short } else { jack_name.as_str() };
                let port = self.decorate(GraphPort::new(
                    &node_id,
                    name,
                    jack_name.clone(),
                    *direction,
                    *connection_type,
                ));
                desired.entry(node_id).or_default().push(port);
            }
        }

        let stale_nodes: Vec<String> = self
            .graph
            .nodes()
            .filter(|n| n.node_type == NodeType::System && !desired.contains_key(&n.id))
            .map(|n| n.id.clone())
            .collect();
        for id in stale_nodes {
            self.graph.remove_node(&id);
        }

        for (node_id, ports) in desired {
            self.graph.upsert_node(GraphNode::system(node_id.clone()));
            let keep: HashSet<&PortId> = ports.iter().map(|p| &p.id).collect();
            let stale: Vec<PortId> = self
                .graph
                .node_ports(&node_id)
                .filter(|p| !keep.contains(&p.id))
                .map(|p| p.id.clone())
                .collect();
            for id in stale {
                self.graph.remove_port(&id);
            }
            for port in ports {
                if let Err(e) = self.graph.upsert_port(port) {
                    log::debug!("[Model] {}", e);
                }
            }
        }
    }

    /// Derive connections from the link reports.
    ///
    /// Each edge is owned by one report: the patcher end if either end is a
    /// patcher port (the source end if both are), otherwise the system source.
    /// Reports from the non-owning end are ignored, so a stale list on one end
    /// can neither resurrect nor duplicate an edge.
    fn rebuild_connections(&mut self) {
        let by_jack: HashMap<&str, &GraphPort> = self
            .graph
            .ports()
            .map(|p| (p.jack_name.as_str(), p))
            .collect();
        let is_patcher = |port: &GraphPort| {
            self.graph
                .node(&port.node_id)
                .is_some_and(|n| n.node_type == NodeType::Patcher)
        };

        let mut edges: BTreeSet<(PortId, PortId)> = BTreeSet::new();
        for (reporter_name, peers) in &self.links {
            let Some(reporter) = by_jack.get(reporter_name.as_str()) else {
                continue;
            };
            for peer_name in peers {
                let Some(peer) = by_jack.get(peer_name.as_str()) else {
                    continue;
                };
                let (source, sink) = match reporter.direction {
                    PortDirection::Source => (*reporter, *peer),
                    PortDirection::Sink => (*peer, *reporter),
                };
                let owner = if is_patcher(source) || !is_patcher(sink) {
                    source
                } else {
                    sink
                };
                if owner.id == reporter.id {
                    edges.insert((source.id.clone(), sink.id.clone()));
                }
            }
        }

        self.graph.clear_connections();
        for (source, sink) in edges {
            if let Err(e) = self.graph.add_connection(&source, &sink) {
                log::debug!("[Model] Ignoring reported connection: {}", e);
            }
        }
    }
}
