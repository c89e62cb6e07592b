//! Device graph: nodes, ports, and the connections between them.
//!
//! Entities live in id-keyed maps and are replaced whole on mutation. Every
//! mutation re-checks the invariants it could break, so the graph can never
//! hold a port without a node or a connection between incompatible ports.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value};

use super::error::ConnectionError;

/// Graph node id: a patcher instance's client name or a system node name.
pub type NodeId = String;

/// Port id, `"<nodeId>:<portName>"`.
pub type PortId = String;

/// Build a port id from its parts.
#[must_use]
pub fn port_id(node_id: &str, port_name: &str) -> PortId {
    format!("{node_id}:{port_name}")
}

/// Split a port id at the first `:` into (node id, port name).
#[must_use]
pub fn split_port_id(port_id: &str) -> Option<(&str, &str)> {
    port_id.split_once(':')
}

/// Which way signal flows through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PortDirection {
    /// Receives signal (an input).
    Sink,
    /// Emits signal (an output).
    Source,
}

/// Signal kind a port carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ConnectionType {
    /// Audio samples.
    Audio,
    /// MIDI events.
    Midi,
}

impl ConnectionType {
    /// Namespace segment for this type (`audio` / `midi`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Midi => "midi",
        }
    }

    /// Parse a namespace segment.
    #[must_use]
    pub fn parse(segment: &str) -> Option<Self> {
        match segment {
            "audio" => Some(Self::Audio),
            "midi" => Some(Self::Midi),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeType {
    /// A running patcher instance.
    Patcher,
    /// Hardware or a non-runner client.
    System,
}

/// A device in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    /// Stable id.
    pub id: NodeId,
    /// Patcher or system.
    pub node_type: NodeType,
    /// Instance index, for patcher nodes.
    pub instance_id: Option<u32>,
    /// Ids of the ports on this node.
    pub ports: BTreeSet<PortId>,
}

impl GraphNode {
    /// Node for a patcher instance.
    #[must_use]
    pub fn patcher(id: impl Into<NodeId>, instance_id: u32) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::Patcher,
            instance_id: Some(instance_id),
            ports: BTreeSet::new(),
        }
    }

    /// Node for system ports.
    #[must_use]
    pub fn system(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::System,
            instance_id: None,
            ports: BTreeSet::new(),
        }
    }
}

/// Well-known keys in a port's property JSON.
pub mod property_keys {
    /// Human-readable port name.
    pub const PRETTY_NAME: &str = "http://jackaudio.org/metadata/pretty-name";
    /// Group the port is displayed under.
    pub const PORT_GROUP: &str = "http://jackaudio.org/metadata/port-group";
    /// Set on hardware ports.
    pub const PHYSICAL: &str = "physical";
    /// Set on ports that originate or terminate signal.
    pub const TERMINAL: &str = "terminal";
}

/// Free-form port metadata published by the runner.
///
/// Recognized keys are lifted into typed accessors; the raw map is kept so
/// unknown keys survive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortProperties {
    raw: Map<String, Value>,
}

impl PortProperties {
    /// Parse the JSON-encoded property string. Invalid JSON yields empty
    /// properties.
    #[must_use]
    pub fn parse(json: &str) -> Self {
        match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(raw)) => Self { raw },
            Ok(_) => Self::default(),
            Err(e) => {
                if !json.trim().is_empty() {
                    log::debug!("[Graph] Ignoring unparsable port properties: {}", e);
                }
                Self::default()
            }
        }
    }

    /// Wrap an already-parsed map.
    #[must_use]
    pub fn from_map(raw: Map<String, Value>) -> Self {
        Self { raw }
    }

    /// Human-readable name, if published.
    #[must_use]
    pub fn pretty_name(&self) -> Option<&str> {
        self.raw.get(property_keys::PRETTY_NAME)?.as_str()
    }

    /// Port group, if published and non-empty.
    #[must_use]
    pub fn port_group(&self) -> Option<&str> {
        self.raw
            .get(property_keys::PORT_GROUP)?
            .as_str()
            .filter(|g| !g.is_empty())
    }

    /// Whether the port is a hardware port.
    #[must_use]
    pub fn is_physical(&self) -> bool {
        self.flag(property_keys::PHYSICAL)
    }

    /// Whether the port is a terminal port.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.flag(property_keys::TERMINAL)
    }

    /// Raw value for any key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    /// The full property map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }

    fn flag(&self, key: &str) -> bool {
        self.raw.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// A port on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphPort {
    /// `"<nodeId>:<portName>"`.
    pub id: PortId,
    /// Owning node.
    pub node_id: NodeId,
    /// Name within the node.
    pub name: String,
    /// Full name on the runner's audio server (`client:port`), used by
    /// connect commands and connection lists.
    pub jack_name: String,
    /// Signal direction.
    pub direction: PortDirection,
    /// Signal kind.
    pub connection_type: ConnectionType,
    /// Alternative names.
    pub aliases: BTreeSet<String>,
    /// Runner-published metadata.
    pub properties: PortProperties,
}

impl GraphPort {
    /// Port `name` on `node_id`.
    #[must_use]
    pub fn new(
        node_id: &str,
        name: &str,
        jack_name: impl Into<String>,
        direction: PortDirection,
        connection_type: ConnectionType,
    ) -> Self {
        Self {
            id: port_id(node_id, name),
            node_id: node_id.to_string(),
            name: name.to_string(),
            jack_name: jack_name.into(),
            direction,
            connection_type,
            aliases: BTreeSet::new(),
            properties: PortProperties::default(),
        }
    }

    /// Display label: pretty name if published, else the port name.
    #[must_use]
    pub fn label(&self) -> &str {
        self.properties.pretty_name().unwrap_or(&self.name)
    }
}

/// Connection identity: ordered `(source, sink)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId {
    /// Source port.
    pub source: PortId,
    /// Sink port.
    pub sink: PortId,
}

impl ConnectionId {
    /// Build an id.
    pub fn new(source: impl Into<PortId>, sink: impl Into<PortId>) -> Self {
        Self {
            source: source.into(),
            sink: sink.into(),
        }
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.source, self.sink)
    }
}

/// A validated edge between a source and a sink port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphConnection {
    /// Source port id.
    pub source_port_id: PortId,
    /// Sink port id.
    pub sink_port_id: PortId,
    /// Shared type of both ports.
    pub connection_type: ConnectionType,
}

impl GraphConnection {
    /// Identity of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        ConnectionId::new(self.source_port_id.clone(), self.sink_port_id.clone())
    }
}

/// Node/port/connection store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    nodes: BTreeMap<NodeId, GraphNode>,
    ports: BTreeMap<PortId, GraphPort>,
    connections: BTreeMap<ConnectionId, GraphConnection>,
}

impl Graph {
    /// Empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Port by id.
    #[must_use]
    pub fn port(&self, id: &str) -> Option<&GraphPort> {
        self.ports.get(id)
    }

    /// Port by its full audio-server name.
    #[must_use]
    pub fn port_by_jack_name(&self, jack_name: &str) -> Option<&GraphPort> {
        self.ports.values().find(|p| p.jack_name == jack_name)
    }

    /// All nodes, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// All ports, ordered by id.
    pub fn ports(&self) -> impl Iterator<Item = &GraphPort> {
        self.ports.values()
    }

    /// Ports of one node, ordered by id.
    pub fn node_ports<'a>(&'a self, node_id: &str) -> impl Iterator<Item = &'a GraphPort> + 'a {
        self.nodes
            .get(node_id)
            .into_iter()
            .flat_map(|n| n.ports.iter())
            .filter_map(|id| self.ports.get(id))
    }

    /// All connections, ordered by id.
    pub fn connections(&self) -> impl Iterator<Item = &GraphConnection> {
        self.connections.values()
    }

    /// Connection by endpoints.
    #[must_use]
    pub fn connection(&self, source: &str, sink: &str) -> Option<&GraphConnection> {
        self.connections.get(&ConnectionId::new(source, sink))
    }

    /// Connections touching `port_id` on either end.
    pub fn port_connections<'a>(
        &'a self,
        port_id: &'a str,
    ) -> impl Iterator<Item = &'a GraphConnection> + 'a {
        self.connections
            .values()
            .filter(move |c| c.source_port_id == port_id || c.sink_port_id == port_id)
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of ports.
    #[must_use]
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Number of connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Insert or replace a node. Existing ports stay attached.
    ///
    /// Returns `true` if the node is new.
    pub fn upsert_node(&mut self, mut node: GraphNode) -> bool {
        match self.nodes.get(&node.id) {
            Some(existing) => {
                node.ports.clone_from(&existing.ports);
                self.nodes.insert(node.id.clone(), node);
                false
            }
            None => {
                log::debug!("[Graph] Node added: {}", node.id);
                self.nodes.insert(node.id.clone(), node);
                true
            }
        }
    }

    /// Remove a node with its ports and every connection touching them.
    ///
    /// Returns the removed node.
    pub fn remove_node(&mut self, id: &str) -> Option<GraphNode> {
        let node = self.nodes.remove(id)?;
        for port in &node.ports {
            self.ports.remove(port);
        }
        self.connections.retain(|cid, _| {
            !node.ports.contains(&cid.source) && !node.ports.contains(&cid.sink)
        });
        log::debug!("[Graph] Node removed: {} ({} ports)", id, node.ports.len());
        Some(node)
    }

    /// Insert or replace a port. The owning node must exist.
    ///
    /// Replacing a port whose direction or type changed drops its connections,
    /// since they may no longer be valid. Returns `true` if the port is new.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::UnknownNode`] if `port.node_id` is not in the graph.
    pub fn upsert_port(&mut self, port: GraphPort) -> Result<bool, ConnectionError> {
        if !self.nodes.contains_key(&port.node_id) {
            return Err(ConnectionError::UnknownNode(port.id));
        }

        let is_new = match self.ports.get(&port.id) {
            Some(old) => {
                if old.direction != port.direction || old.connection_type != port.connection_type
                {
                    let id = port.id.clone();
                    self.connections
                        .retain(|cid, _| cid.source != id && cid.sink != id);
                }
                false
            }
            None => true,
        };

        if let Some(node) = self.nodes.get_mut(&port.node_id) {
            node.ports.insert(port.id.clone());
        }
        self.ports.insert(port.id.clone(), port);
        Ok(is_new)
    }

    /// Remove a port and every connection touching it.
    pub fn remove_port(&mut self, id: &str) -> Option<GraphPort> {
        let port = self.ports.remove(id)?;
        if let Some(node) = self.nodes.get_mut(&port.node_id) {
            node.ports.remove(id);
        }
        self.connections
            .retain(|cid, _| cid.source != id && cid.sink != id);
        Some(port)
    }

    /// Mutable port access for in-place metadata updates.
    pub(crate) fn port_mut(&mut self, id: &str) -> Option<&mut GraphPort> {
        self.ports.get_mut(id)
    }

    /// Check whether `source → sink` would be a legal connection.
    ///
    /// Checks run in order: both nodes exist, both ports exist on them, the
    /// types match, and the directions form a source/sink pair. Never mutates.
    ///
    /// # Errors
    ///
    /// The first failed check, as a [`ConnectionError`].
    pub fn validate_connection(
        &self,
        source: &str,
        sink: &str,
    ) -> Result<ConnectionType, ConnectionError> {
        for id in [source, sink] {
            let known_node = split_port_id(id).is_some_and(|(node, _)| self.nodes.contains_key(node));
            if !known_node {
                return Err(ConnectionError::UnknownNode(id.to_string()));
            }
        }

        let lookup = |id: &str| {
            let (node_id, _) = split_port_id(id)?;
            let node = self.nodes.get(node_id)?;
            node.ports.contains(id).then(|| self.ports.get(id)).flatten()
        };
        let source_port =
            lookup(source).ok_or_else(|| ConnectionError::UnknownPort(source.to_string()))?;
        let sink_port =
            lookup(sink).ok_or_else(|| ConnectionError::UnknownPort(sink.to_string()))?;

        if source_port.connection_type != sink_port.connection_type {
            return Err(ConnectionError::TypeMismatch {
                source_port: source.to_string(),
                source_type: source_port.connection_type,
                sink_port: sink.to_string(),
                sink_type: sink_port.connection_type,
            });
        }

        if source_port.direction != PortDirection::Source
            || sink_port.direction != PortDirection::Sink
        {
            return Err(ConnectionError::DirectionMismatch {
                source_port: source.to_string(),
                sink_port: sink.to_string(),
            });
        }

        Ok(source_port.connection_type)
    }

    /// Validate and insert a connection. Duplicates collapse.
    ///
    /// Returns `true` if the connection is new.
    ///
    /// # Errors
    ///
    /// Any [`ConnectionError`] from [`Self::validate_connection`]; the graph is
    /// left unchanged.
    pub fn add_connection(&mut self, source: &str, sink: &str) -> Result<bool, ConnectionError> {
        let connection_type = self.validate_connection(source, sink)?;
        let id = ConnectionId::new(source, sink);
        if self.connections.contains_key(&id) {
            return Ok(false);
        }
        self.connections.insert(
            id,
            GraphConnection {
                source_port_id: source.to_string(),
                sink_port_id: sink.to_string(),
                connection_type,
            },
        );
        Ok(true)
    }

    /// Remove a connection. Returns `true` if it existed.
    pub fn remove_connection(&mut self, source: &str, sink: &str) -> bool {
        self.connections
            .remove(&ConnectionId::new(source, sink))
            .is_some()
    }

    /// Drop every connection.
    pub fn clear_connections(&mut self) {
        self.connections.clear();
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.ports.clear();
        self.connections.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Graph {
        let mut g = Graph::new();
        g.upsert_node(GraphNode::system("system-in"));
        g.upsert_node(GraphNode::system("system-out"));
        g.upsert_node(GraphNode::patcher("rnbo-0", 0));
        for port in [
            GraphPort::new("system-in", "capture_1", "system:capture_1", PortDirection::Source, ConnectionType::Audio),
            GraphPort::new("system-out", "playback_1", "system:playback_1", PortDirection::Sink, ConnectionType::Audio),
            GraphPort::new("system-out", "playback_2", "system:playback_2", PortDirection::Sink, ConnectionType::Audio),
            GraphPort::new("rnbo-0", "in1", "rnbo-0:in1", PortDirection::Sink, ConnectionType::Audio),
            GraphPort::new("rnbo-0", "out1", "rnbo-0:out1", PortDirection::Source, ConnectionType::Audio),
            GraphPort::new("rnbo-0", "midiin", "rnbo-0:midiin", PortDirection::Sink, ConnectionType::Midi),
        ] {
            g.upsert_port(port).unwrap();
        }
        g
    }

    #[test]
    fn test_valid_connection_accepted() {
        let mut g = graph();
        assert_eq!(g.add_connection("rnbo-0:out1", "system-out:playback_1"), Ok(true));
        assert_eq!(g.connection_count(), 1);
    }

    #[test]
    fn test_duplicate_connection_collapses() {
        let mut g = graph();
        assert_eq!(g.add_connection("system-in:capture_1", "rnbo-0:in1"), Ok(true));
        assert_eq!(g.add_connection("system-in:capture_1", "rnbo-0:in1"), Ok(false));
        assert_eq!(g.connection_count(), 1);
    }

    #[test]
    fn test_validation_order() {
        let g = graph();
        assert!(matches!(
            g.validate_connection("nope:out", "rnbo-0:in1"),
            Err(ConnectionError::UnknownNode(_))
        ));
        assert!(matches!(
            g.validate_connection("noseparator", "rnbo-0:in1"),
            Err(ConnectionError::UnknownNode(_))
        ));
        assert!(matches!(
            g.validate_connection("rnbo-0:out9", "rnbo-0:in1"),
            Err(ConnectionError::UnknownPort(_))
        ));
        assert!(matches!(
            g.validate_connection("system-in:capture_1", "rnbo-0:midiin"),
            Err(ConnectionError::TypeMismatch { .. })
        ));
        assert!(matches!(
            g.validate_connection("system-out:playback_1", "system-out:playback_2"),
            Err(ConnectionError::DirectionMismatch { .. })
        ));
    }

    #[test]
    fn test_reversed_pair_is_direction_mismatch() {
        let g = graph();
        assert!(matches!(
            g.validate_connection("rnbo-0:in1", "system-in:capture_1"),
            Err(ConnectionError::DirectionMismatch { .. })
        ));
    }

    #[test]
    fn test_rejected_connection_leaves_graph_unchanged() {
        let mut g = graph();
        g.add_connection("rnbo-0:out1", "system-out:playback_1").unwrap();
        let before = g.clone();
        assert!(g.add_connection("system-out:playback_1", "system-out:playback_2").is_err());
        assert_eq!(g, before);
    }

    #[test]
    fn test_remove_node_cascades() {
        let mut g = graph();
        g.add_connection("rnbo-0:out1", "system-out:playback_1").unwrap();
        g.add_connection("system-in:capture_1", "rnbo-0:in1").unwrap();

        let removed = g.remove_node("rnbo-0").unwrap();
        assert_eq!(removed.ports.len(), 3);
        assert!(g.port("rnbo-0:out1").is_none());
        assert_eq!(g.connection_count(), 0);
        assert!(g.port("system-out:playback_1").is_some());
    }

    #[test]
    fn test_port_requires_node() {
        let mut g = Graph::new();
        let port = GraphPort::new("ghost", "out", "ghost:out", PortDirection::Source, ConnectionType::Audio);
        assert!(matches!(g.upsert_port(port), Err(ConnectionError::UnknownNode(_))));
        assert_eq!(g.port_count(), 0);
    }

    #[test]
    fn test_upsert_port_is_idempotent() {
        let mut g = graph();
        let port = GraphPort::new("rnbo-0", "out1", "rnbo-0:out1", PortDirection::Source, ConnectionType::Audio);
        assert_eq!(g.upsert_port(port), Ok(false));
        assert_eq!(g.node("rnbo-0").unwrap().ports.len(), 3);
    }

    #[test]
    fn test_retyped_port_drops_connections() {
        let mut g = graph();
        g.add_connection("rnbo-0:out1", "system-out:playback_1").unwrap();
        let retyped = GraphPort::new("rnbo-0", "out1", "rnbo-0:out1", PortDirection::Source, ConnectionType::Midi);
        g.upsert_port(retyped).unwrap();
        assert_eq!(g.connection_count(), 0);
    }

    #[test]
    fn test_upsert_node_keeps_ports() {
        let mut g = graph();
        assert!(!g.upsert_node(GraphNode::patcher("rnbo-0", 0)));
        assert_eq!(g.node_ports("rnbo-0").count(), 3);
    }

    #[test]
    fn test_port_properties() {
        let props = PortProperties::parse(
            r#"{"http://jackaudio.org/metadata/pretty-name": "Left", "physical": true, "x": 1}"#,
        );
        assert_eq!(props.pretty_name(), Some("Left"));
        assert!(props.is_physical());
        assert!(!props.is_terminal());
        assert_eq!(props.get("x"), Some(&serde_json::json!(1)));
        assert_eq!(PortProperties::parse("not json"), PortProperties::default());
    }
}
