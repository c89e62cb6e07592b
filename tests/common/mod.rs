//! Shared fixtures: namespace dumps shaped like the runner's replies.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use serde_json::{json, Value};

/// One value leaf.
pub fn leaf(path: &str, type_tags: &str, value: Value) -> Value {
    json!({ "FULL_PATH": path, "TYPE": type_tags, "VALUE": value })
}

/// A container with the given children, keyed by their last path segment.
pub fn container(path: &str, children: Vec<Value>) -> Value {
    let mut contents = serde_json::Map::new();
    for child in children {
        let full = child["FULL_PATH"].as_str().unwrap_or_default().to_string();
        let key = full.rsplit('/').next().unwrap_or_default().to_string();
        contents.insert(key, child);
    }
    json!({ "FULL_PATH": path, "CONTENTS": contents })
}

/// `/rnbo/patchers` with one stereo synth.
pub fn patchers() -> Value {
    container(
        "/rnbo/patchers",
        vec![container(
            "/rnbo/patchers/synth",
            vec![
                leaf("/rnbo/patchers/synth/io", "iiii", json!([1, 2, 0, 0])),
                leaf(
                    "/rnbo/patchers/synth/created_at",
                    "s",
                    json!("2024-03-01T10:00:00Z"),
                ),
            ],
        )],
    )
}

/// `/rnbo/jack/info/ports`: two capture, two playback, and the instance's ports.
pub fn jack_ports() -> Value {
    container(
        "/rnbo/jack/info/ports",
        vec![
            container(
                "/rnbo/jack/info/ports/audio",
                vec![
                    leaf(
                        "/rnbo/jack/info/ports/audio/sources",
                        "sss",
                        json!(["system:capture_1", "system:capture_2", "rnbo-0:out1", "rnbo-0:out2"]),
                    ),
                    leaf(
                        "/rnbo/jack/info/ports/audio/sinks",
                        "sss",
                        json!(["system:playback_1", "system:playback_2", "rnbo-0:in1"]),
                    ),
                ],
            ),
            container(
                "/rnbo/jack/info/ports/midi",
                vec![
                    leaf("/rnbo/jack/info/ports/midi/sources", "s", json!("system:midi_capture_1")),
                    leaf("/rnbo/jack/info/ports/midi/sinks", "", json!([])),
                ],
            ),
            container(
                "/rnbo/jack/info/ports/properties",
                vec![leaf(
                    "/rnbo/jack/info/ports/properties/system:capture_1",
                    "s",
                    json!(r#"{"http://jackaudio.org/metadata/pretty-name": "Mic"}"#),
                )],
            ),
        ],
    )
}

/// `/rnbo/inst` with instance 0 wired capture_1 -> in1 and out1 -> playback_1.
pub fn instances() -> Value {
    container(
        "/rnbo/inst",
        vec![
            container(
                "/rnbo/inst/0",
                vec![
                    leaf("/rnbo/inst/0/name", "s", json!("synth")),
                    container(
                        "/rnbo/inst/0/config",
                        vec![leaf("/rnbo/inst/0/config/name_alias", "s", json!("lead"))],
                    ),
                    container(
                        "/rnbo/inst/0/jack",
                        vec![
                            leaf("/rnbo/inst/0/jack/name", "s", json!("rnbo-0")),
                            leaf("/rnbo/inst/0/jack/audio_ins", "s", json!("rnbo-0:in1")),
                            leaf(
                                "/rnbo/inst/0/jack/audio_outs",
                                "ss",
                                json!(["rnbo-0:out1", "rnbo-0:out2"]),
                            ),
                            container(
                                "/rnbo/inst/0/jack/connections",
                                vec![container(
                                    "/rnbo/inst/0/jack/connections/audio",
                                    vec![
                                        container(
                                            "/rnbo/inst/0/jack/connections/audio/sources",
                                            vec![leaf(
                                                "/rnbo/inst/0/jack/connections/audio/sources/out1",
                                                "s",
                                                json!(["system:playback_1"]),
                                            )],
                                        ),
                                        container(
                                            "/rnbo/inst/0/jack/connections/audio/sinks",
                                            vec![leaf(
                                                "/rnbo/inst/0/jack/connections/audio/sinks/in1",
                                                "s",
                                                json!(["system:capture_1"]),
                                            )],
                                        ),
                                    ],
                                )],
                            ),
                        ],
                    ),
                    container(
                        "/rnbo/inst/0/params",
                        vec![
                            json!({
                                "FULL_PATH": "/rnbo/inst/0/params/gain",
                                "TYPE": "f",
                                "VALUE": 5.0,
                                "RANGE": [{"MIN": 0.0, "MAX": 10.0}],
                                "CONTENTS": {
                                    "index": leaf("/rnbo/inst/0/params/gain/index", "i", json!(0)),
                                    "normalized": leaf("/rnbo/inst/0/params/gain/normalized", "f", json!(0.5)),
                                }
                            }),
                            json!({
                                "FULL_PATH": "/rnbo/inst/0/params/wave",
                                "TYPE": "s",
                                "VALUE": "sine",
                                "RANGE": [{"VALS": ["sine", "saw"]}],
                                "CONTENTS": {
                                    "index": leaf("/rnbo/inst/0/params/wave/index", "i", json!(1)),
                                }
                            }),
                        ],
                    ),
                    container(
                        "/rnbo/inst/0/presets",
                        vec![
                            leaf("/rnbo/inst/0/presets/entries", "ss", json!(["init", "bright"])),
                            leaf("/rnbo/inst/0/presets/loaded", "s", json!("init")),
                            leaf("/rnbo/inst/0/presets/initial", "s", json!("init")),
                        ],
                    ),
                    container(
                        "/rnbo/inst/0/data_refs",
                        vec![
                            leaf("/rnbo/inst/0/data_refs/samples", "s", json!("kick.wav")),
                            leaf("/rnbo/inst/0/data_refs/table", "s", json!("")),
                        ],
                    ),
                    container(
                        "/rnbo/inst/0/messages",
                        vec![
                            container(
                                "/rnbo/inst/0/messages/in",
                                vec![leaf("/rnbo/inst/0/messages/in/trigger", "", json!(null))],
                            ),
                            container(
                                "/rnbo/inst/0/messages/out",
                                vec![leaf("/rnbo/inst/0/messages/out/level", "f", json!(0.0))],
                            ),
                        ],
                    ),
                ],
            ),
            container(
                "/rnbo/inst/config",
                vec![json!({
                    "FULL_PATH": "/rnbo/inst/config/auto_start_last",
                    "TYPE": "T",
                    "VALUE": null,
                    "DESCRIPTION": "Start the last loaded set at boot",
                })],
            ),
            container(
                "/rnbo/inst/control",
                vec![container(
                    "/rnbo/inst/control/sets",
                    vec![
                        json!({
                            "FULL_PATH": "/rnbo/inst/control/sets/load",
                            "TYPE": "s",
                            "VALUE": "",
                            "RANGE": [{"VALS": ["Factory", "Live"]}],
                        }),
                        leaf("/rnbo/inst/control/sets/initial", "s", json!("Factory")),
                        container(
                            "/rnbo/inst/control/sets/current",
                            vec![
                                leaf("/rnbo/inst/control/sets/current/name", "s", json!("Live")),
                                json!({"FULL_PATH": "/rnbo/inst/control/sets/current/dirty", "TYPE": "F", "VALUE": null}),
                            ],
                        ),
                        container(
                            "/rnbo/inst/control/sets/views",
                            vec![
                                container(
                                    "/rnbo/inst/control/sets/views/list",
                                    vec![container(
                                        "/rnbo/inst/control/sets/views/list/1",
                                        vec![
                                            leaf("/rnbo/inst/control/sets/views/list/1/name", "s", json!("Mix")),
                                            leaf("/rnbo/inst/control/sets/views/list/1/params", "ss", json!(["0:1", "0:0"])),
                                        ],
                                    )],
                                ),
                                leaf("/rnbo/inst/control/sets/views/order", "i", json!(1)),
                            ],
                        ),
                    ],
                )],
            ),
        ],
    )
}

/// `/rnbo/jack/connections`; the system end repeats the instance's report.
pub fn jack_connections() -> Value {
    container(
        "/rnbo/jack/connections",
        vec![container(
            "/rnbo/jack/connections/audio",
            vec![leaf(
                "/rnbo/jack/connections/audio/system:capture_1",
                "s",
                json!(["rnbo-0:in1"]),
            )],
        )],
    )
}

/// `/rnbo/jack/transport`.
pub fn jack_transport() -> Value {
    container(
        "/rnbo/jack/transport",
        vec![
            leaf("/rnbo/jack/transport/bpm", "f", json!(98.0)),
            json!({"FULL_PATH": "/rnbo/jack/transport/rolling", "TYPE": "T", "VALUE": null}),
            json!({"FULL_PATH": "/rnbo/jack/transport/sync", "TYPE": "F", "VALUE": null}),
        ],
    )
}

/// `/rnbo/jack/info`: load statistics plus the port inventory.
pub fn jack_info() -> Value {
    let mut info = container(
        "/rnbo/jack/info",
        vec![
            json!({
                "FULL_PATH": "/rnbo/jack/info/cpu_load",
                "TYPE": "f",
                "VALUE": 12.5,
                "DESCRIPTION": "DSP load in percent",
            }),
            leaf("/rnbo/jack/info/xrun_count", "i", json!(3)),
        ],
    );
    info["CONTENTS"]["ports"] = jack_ports();
    info
}

/// `/rnbo/jack/record`, idle.
pub fn jack_record() -> Value {
    container(
        "/rnbo/jack/record",
        vec![
            json!({"FULL_PATH": "/rnbo/jack/record/active", "TYPE": "F", "VALUE": null}),
            leaf("/rnbo/jack/record/captured", "f", json!(0.0)),
        ],
    )
}

/// `/rnbo/config`.
pub fn runner_config() -> Value {
    container(
        "/rnbo/config",
        vec![leaf("/rnbo/config/instance_audio_fade_in", "f", json!(10.0))],
    )
}

/// `/rnbo/jack/config` with a choice-list value.
pub fn jack_config() -> Value {
    container(
        "/rnbo/jack/config",
        vec![json!({
            "FULL_PATH": "/rnbo/jack/config/period_frames",
            "TYPE": "i",
            "VALUE": 256,
            "RANGE": [{"VALS": [64, 128, 256, 512]}],
        })],
    )
}

/// Reply for one of the initial state requests.
pub fn reply_for(path: &str) -> Option<Value> {
    match path {
        "/rnbo/patchers" => Some(patchers()),
        "/rnbo/jack/info" => Some(jack_info()),
        "/rnbo/jack/info/ports" => Some(jack_ports()),
        "/rnbo/inst" => Some(instances()),
        "/rnbo/jack/connections" => Some(jack_connections()),
        "/rnbo/jack/transport" => Some(jack_transport()),
        "/rnbo/jack/record" => Some(jack_record()),
        "/rnbo/config" => Some(runner_config()),
        "/rnbo/jack/config" => Some(jack_config()),
        _ => None,
    }
}
