//! Graph store invariants, exercised through the public model API.

use std::collections::BTreeMap;

use runner_bridge::model::{
    normalize, ConnectionError, ConnectionType, Graph, GraphModel, GraphNode, GraphPort,
    InstanceRecord, ParameterKey, ParameterRecord, PortDirection, PortSpec,
};

const AUDIO_SOURCE: PortSpec = PortSpec {
    direction: PortDirection::Source,
    connection_type: ConnectionType::Audio,
};
const AUDIO_SINK: PortSpec = PortSpec {
    direction: PortDirection::Sink,
    connection_type: ConnectionType::Audio,
};
const MIDI_SINK: PortSpec = PortSpec {
    direction: PortDirection::Sink,
    connection_type: ConnectionType::Midi,
};

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// System capture/playback plus one instance with an audio in/out and a MIDI in.
fn model() -> GraphModel {
    let mut model = GraphModel::new();
    model.set_port_inventory(AUDIO_SOURCE, names(&["system:capture_1"]));
    model.set_port_inventory(AUDIO_SINK, names(&["system:playback_1", "system:playback_2"]));

    let mut ports = BTreeMap::new();
    ports.insert("rnbo-0:in1".to_string(), AUDIO_SINK);
    ports.insert("rnbo-0:out1".to_string(), AUDIO_SOURCE);
    ports.insert("rnbo-0:midiin1".to_string(), MIDI_SINK);
    let params = vec![ParameterRecord::new(0, 0, "gain", "/rnbo/inst/0/params/gain", 0.0, 10.0)];
    model.upsert_instance(InstanceRecord::new(0), ports, params);
    model
}

fn assert_connections_valid(graph: &Graph) {
    for connection in graph.connections() {
        let source = graph.port(&connection.source_port_id).unwrap();
        let sink = graph.port(&connection.sink_port_id).unwrap();
        assert_eq!(source.direction, PortDirection::Source);
        assert_eq!(sink.direction, PortDirection::Sink);
        assert_eq!(source.connection_type, sink.connection_type);
        assert_eq!(connection.connection_type, source.connection_type);
    }
}

#[test]
fn test_sink_to_sink_rejected_and_model_unchanged() {
    let mut model = model();
    model.set_port_links("rnbo-0:out1", names(&["system:playback_1"]));
    let before = model.graph().clone();

    let err = model
        .validate_connection("system-out:playback_1", "rnbo-0:in1")
        .unwrap_err();
    assert_eq!(
        err,
        ConnectionError::DirectionMismatch {
            source_port: "system-out:playback_1".into(),
            sink_port: "rnbo-0:in1".into(),
        }
    );
    assert_eq!(model.graph(), &before);
}

#[test]
fn test_validation_errors() {
    let model = model();
    assert!(matches!(
        model.validate_connection("nowhere:out", "rnbo-0:in1"),
        Err(ConnectionError::UnknownNode(_))
    ));
    assert!(matches!(
        model.validate_connection("rnbo-0:out9", "rnbo-0:in1"),
        Err(ConnectionError::UnknownPort(_))
    ));
    assert!(matches!(
        model.validate_connection("system-in:capture_1", "rnbo-0:midiin1"),
        Err(ConnectionError::TypeMismatch { .. })
    ));
    assert_eq!(
        model.validate_connection("system-in:capture_1", "rnbo-0:in1"),
        Ok(ConnectionType::Audio)
    );
}

#[test]
fn test_invalid_reports_never_become_connections() {
    let mut model = model();
    // Wrong type, and a peer on the wrong side.
    model.set_port_links("rnbo-0:midiin1", names(&["system:capture_1"]));
    model.set_port_links("rnbo-0:out1", names(&["system:playback_1", "rnbo-0:in1", "system:capture_1"]));

    assert_connections_valid(model.graph());
    assert!(model.graph().connection("rnbo-0:out1", "system-out:playback_1").is_some());
    assert!(model.graph().connection("rnbo-0:out1", "rnbo-0:in1").is_some());
    assert_eq!(model.graph().connection_count(), 2);
}

#[test]
fn test_repeated_events_are_idempotent() {
    let mut model = model();
    model.set_port_links("rnbo-0:out1", names(&["system:playback_1"]));
    let once = model.graph().clone();

    model.set_port_inventory(AUDIO_SINK, names(&["system:playback_1", "system:playback_2"]));
    model.set_port_links("rnbo-0:out1", names(&["system:playback_1"]));
    model.set_port_links("system:playback_1", names(&["rnbo-0:out1"]));
    assert_eq!(model.graph(), &once);

    let mut graph = Graph::new();
    graph.upsert_node(GraphNode::system("a"));
    graph.upsert_node(GraphNode::system("b"));
    for _ in 0..2 {
        graph
            .upsert_port(GraphPort::new("a", "out", "a:out", PortDirection::Source, ConnectionType::Audio))
            .unwrap();
        graph
            .upsert_port(GraphPort::new("b", "in", "b:in", PortDirection::Sink, ConnectionType::Audio))
            .unwrap();
        graph.add_connection("a:out", "b:in").unwrap();
    }
    assert_eq!((graph.node_count(), graph.port_count(), graph.connection_count()), (2, 2, 1));
}

#[test]
fn test_instance_removal_cascades() {
    let mut model = model();
    model.set_port_links("rnbo-0:out1", names(&["system:playback_1"]));
    model.set_port_links("rnbo-0:in1", names(&["system:capture_1"]));
    assert_eq!(model.graph().connection_count(), 2);

    model.remove_instance(0).unwrap();
    let graph = model.graph();
    assert!(graph.node("rnbo-0").is_none());
    assert!(graph.ports().all(|p| p.node_id != "rnbo-0"));
    assert_eq!(graph.connection_count(), 0);
    assert!(model.parameter(ParameterKey::new(0, 0)).is_none());
    assert!(graph.node("system-in").is_some());
}

#[test]
fn test_normalization_round_trip() {
    let model = model();
    let gain = model.parameter(ParameterKey::new(0, 0)).unwrap();
    assert_eq!(gain.denormalize(0.5), 5.0);
    assert_eq!(gain.normalize(5.0), 0.5);

    // Enumerated: three values spread over [0, 1]; one value pins to 0.
    assert_eq!(normalize(1.0, 0.0, 2.0, 3), 0.5);
    assert_eq!(normalize(0.0, 0.0, 0.0, 1), 0.0);
}

#[test]
fn test_provisional_edit_replaced_by_remote_value() {
    let mut model = model();
    let key = ParameterKey::new(0, 0);
    let gain = model.parameter_mut(key).unwrap();
    gain.set_provisional_normalized(0.5);
    assert!(gain.provisional);
    assert_eq!(gain.value, 5.0);

    gain.apply_normalized(0.3);
    assert!(!gain.provisional);
    assert_eq!(gain.normalized, 0.3);
}
