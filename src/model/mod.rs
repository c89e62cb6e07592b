//! Domain model mirrored from the runner.
//!
//! [`GraphModel`] is the single store. The synchronizer is its only writer
//! for authoritative state; everything else reads it or goes through the
//! bridge, whose optimistic edits are tagged provisional and overwritten by
//! the next remote update for the same parameter.

pub mod error;
pub mod graph;
pub mod instance;
pub mod parameter;
pub mod runner;
pub mod sets;
pub mod store;

pub use error::ConnectionError;
pub use graph::{
    port_id, split_port_id, ConnectionId, ConnectionType, Graph, GraphConnection, GraphNode,
    GraphPort, NodeId, NodeType, PortDirection, PortId, PortProperties,
};
pub use instance::{
    DataRefRecord, InstanceRecord, MessagePortRecord, PatcherRecord, PresetRecord, RunnerTransport,
};
pub use parameter::{denormalize, normalize, MidiMapping, ParameterKey, ParameterRecord};
pub use runner::{
    ConfigEntry, ConfigScope, RunnerInfoKey, RunnerInfoRecord, RunnerState, StreamRecording,
};
pub use sets::{GraphSetRecord, GraphSetViewRecord, SetCollection};
pub use store::{GraphModel, PortSpec};
