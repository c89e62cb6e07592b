//! Open Sound Control packet model and binary codec.
//!
//! The runner pushes live namespace updates as binary OSC frames over the
//! websocket, and the bridge sends commands back the same way. Encoding is
//! infallible; decoding validates every field and reports an [`OscError`] that
//! the caller logs before discarding the frame.
//!
//! # Example
//!
//! ```
//! use runner_bridge::osc::{decode, encode, OscMessage, OscPacket, OscType};
//!
//! let packet = OscPacket::Message(OscMessage::new(
//!     "/rnbo/inst/control/sets/load",
//!     vec![OscType::String("Factory".into())],
//! ));
//! assert_eq!(decode(&encode(&packet)).unwrap(), packet);
//! ```

pub mod codec;
pub mod loose;
pub mod types;

pub use codec::{decode, encode, encode_message, OscError};
pub use loose::{args_value, decode_value, to_value, DecodeOptions};
pub use types::{OscBundle, OscMessage, OscPacket, OscTime, OscType};
