//! Domain validation errors.

use super::graph::{ConnectionType, PortId};

/// Why a proposed connection was rejected.
///
/// Returned by [`Graph::validate_connection`](super::graph::Graph::validate_connection)
/// and [`Graph::add_connection`](super::graph::Graph::add_connection). A rejected
/// connection leaves every other part of the model untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The port id does not name an existing node.
    #[error("unknown node for port {0}")]
    UnknownNode(PortId),
    /// The node exists but has no such port.
    #[error("unknown port {0}")]
    UnknownPort(PortId),
    /// Audio cannot be wired to MIDI or vice versa.
    #[error("cannot connect {source_type} port {source_port} to {sink_type} port {sink_port}")]
    TypeMismatch {
        /// Proposed source port.
        source_port: PortId,
        /// Its connection type.
        source_type: ConnectionType,
        /// Proposed sink port.
        sink_port: PortId,
        /// Its connection type.
        sink_type: ConnectionType,
    },
    /// The source is not a source port or the sink is not a sink port.
    #[error("cannot connect {source_port} to {sink_port}: port directions do not form a source/sink pair")]
    DirectionMismatch {
        /// Proposed source port.
        source_port: PortId,
        /// Proposed sink port.
        sink_port: PortId,
    },
}
