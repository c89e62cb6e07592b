//! Loosely-typed JSON view of decoded packets.
//!
//! Mirrors the shape browser OSC libraries hand to application code:
//! `{"address", "args"}` for messages and `{"timeTag": {"raw", "native"},
//! "packets"}` for bundles. Used for logging and the `decode` CLI command; the
//! synchronizer works on the typed packets instead.

use serde_json::{json, Value};

use super::codec::{decode, OscError};
use super::types::{OscPacket, OscType};

/// Controls how much type information the loose view keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Keep `{"type", "value"}` pairs instead of bare values.
    pub metadata: bool,
    /// Replace a one-element argument list with the bare element.
    pub unpack_single_args: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            metadata: false,
            unpack_single_args: true,
        }
    }
}

/// Decode a frame straight into its loose JSON view.
pub fn decode_value(bytes: &[u8], options: DecodeOptions) -> Result<Value, OscError> {
    decode(bytes).map(|packet| to_value(&packet, options))
}

/// Render a typed packet as loose JSON.
#[must_use]
pub fn to_value(packet: &OscPacket, options: DecodeOptions) -> Value {
    match packet {
        OscPacket::Message(msg) => {
            json!({ "address": msg.addr, "args": args_value(&msg.args, options) })
        }
        OscPacket::Bundle(bundle) => json!({
            "timeTag": {
                "raw": [bundle.timetag.seconds, bundle.timetag.fractional],
                "native": bundle.timetag.native(),
            },
            "packets": bundle
                .content
                .iter()
                .map(|p| to_value(p, options))
                .collect::<Vec<_>>(),
        }),
    }
}

/// Render an argument list as loose JSON.
#[must_use]
pub fn args_value(args: &[OscType], options: DecodeOptions) -> Value {
    let mut values: Vec<Value> = args
        .iter()
        .map(|arg| arg_value(arg, options.metadata))
        .collect();
    if options.unpack_single_args && values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

fn arg_value(arg: &OscType, metadata: bool) -> Value {
    let value = match arg {
        OscType::Int(v) => json!(v),
        OscType::Float(v) => json!(v),
        OscType::String(s) => json!(s),
        OscType::Blob(b) => json!(b),
        OscType::Long(v) => json!(v),
        OscType::Double(v) => json!(v),
        OscType::Time(t) => json!({ "raw": [t.seconds, t.fractional], "native": t.native() }),
        OscType::Char(c) => json!(c.to_string()),
        OscType::Bool(b) => json!(b),
        OscType::Nil => Value::Null,
        OscType::Inf => json!(1.0),
    };
    if metadata {
        json!({ "type": arg.tag().to_string(), "value": value })
    } else {
        value
    }
}
