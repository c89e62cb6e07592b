//! Runner Bridge - mirrors an audio runner's device graph over OSC/OSCQuery.
//!
//! This crate keeps a strongly typed local copy of a remote runner's state
//! (patch instances, their ports and connections, parameters, graph sets)
//! and turns local intents into OSC commands.
//!
//! # Architecture
//!
//! The crate follows a layered design:
//!
//! - **Transport** - Self-healing WebSocket link with a bounded retry policy
//! - **Codec** - OSC 1.0 messages and bundles on the binary channel
//! - **Synchronizer** - Applies snapshots, leaf updates and structural events
//! - **Model** - Graph store, parameters, sets and instances
//! - **Bridge** - Explicit Transport + Synchronizer pair driven by the caller
//!
//! # Modules
//!
//! - [`bridge`] - Event loop, application status, optimistic edits
//! - [`commands`] - Outbound intents encoded as OSC
//! - [`model`] - Domain model and connection validation
//! - [`osc`] - Wire codec
//! - [`sync`] - Address-tree synchronizer
//! - [`transport`] - Reconnecting duplex link
//! - [`config`] - Configuration loading/saving

// Library modules
pub mod bridge;
pub mod commands;
pub mod model;
pub mod osc;
pub mod sync;
pub mod transport;
pub mod ws;

pub mod config;
pub mod constants;

// Re-export commonly used types
pub use bridge::{AppStatus, Bridge, BridgeEvent};
pub use commands::{Command, CommandError};
pub use config::Config;
pub use model::GraphModel;
pub use sync::Synchronizer;
pub use transport::{ConnectionState, RetryPolicy, Transport, TransportError, TransportEvent};
