//! Application-wide constants for runner-bridge.
//!
//! Centralizes defaults and the fixed parts of the runner's address
//! namespace.
//!
//! # Categories
//!
//! - **Connection**: endpoint and retry defaults
//! - **Sync**: state-request timing
//! - **Namespace**: well-known runner addresses

use std::time::Duration;

// ============================================================================
// Connection
// ============================================================================

/// Default runner host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default runner OSCQuery/WebSocket port.
pub const DEFAULT_PORT: u16 = 5678;

/// Attempts per reconnect cycle.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Delay between failed attempts, in milliseconds.
pub const DEFAULT_RETRY_TIMEOUT_MS: u64 = 500;

// ============================================================================
// Sync
// ============================================================================

/// Delay before requesting a newly added instance, in milliseconds.
///
/// The runner announces the instance before it has finished wiring its
/// ports, so an immediate request returns a partial subtree.
pub const DEFAULT_INSTANCE_ADD_DELAY_MS: u64 = 500;

/// How long the bridge waits for the initial state before reporting `Ready`
/// with whatever arrived.
pub const INITIAL_SYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// How long one-shot CLI commands wait for the runner to confirm.
pub const COMMAND_CONFIRM_TIMEOUT: Duration = Duration::from_secs(3);

// ============================================================================
// Namespace
// ============================================================================

/// Patcher list.
pub const PATCHERS_PATH: &str = "/rnbo/patchers";

/// Audio server info: load statistics and the port inventory.
pub const JACK_INFO_PATH: &str = "/rnbo/jack/info";

/// System port inventory.
pub const JACK_PORTS_PATH: &str = "/rnbo/jack/info/ports";

/// Instance container.
pub const INSTANCES_PATH: &str = "/rnbo/inst";

/// System-level port connection lists.
pub const JACK_CONNECTIONS_PATH: &str = "/rnbo/jack/connections";

/// Runner transport (tempo and play state).
pub const JACK_TRANSPORT_PATH: &str = "/rnbo/jack/transport";

/// Stream recorder.
pub const JACK_RECORD_PATH: &str = "/rnbo/jack/record";

/// Runner configuration.
pub const RUNNER_CONFIG_PATH: &str = "/rnbo/config";

/// Audio server configuration.
pub const JACK_CONFIG_PATH: &str = "/rnbo/jack/config";

/// Configuration shared by every instance.
pub const INSTANCE_CONFIG_PATH: &str = "/rnbo/inst/config";

/// Instance control container (sets, load/unload).
pub const INSTANCE_CONTROL_PATH: &str = "/rnbo/inst/control";

/// Set container.
pub const SETS_PATH: &str = "/rnbo/inst/control/sets";

/// Set-view container.
pub const SET_VIEWS_PATH: &str = "/rnbo/inst/control/sets/views";

/// State requested after every (re)connect, in order.
pub const INITIAL_STATE_PATHS: [&str; 8] = [
    PATCHERS_PATH,
    JACK_INFO_PATH,
    INSTANCES_PATH,
    JACK_CONNECTIONS_PATH,
    JACK_TRANSPORT_PATH,
    JACK_RECORD_PATH,
    RUNNER_CONFIG_PATH,
    JACK_CONFIG_PATH,
];

/// Client name the runner's audio server uses for hardware ports.
pub const SYSTEM_CLIENT: &str = "system";

/// Graph node holding hardware capture ports (sources).
pub const SYSTEM_INPUT_NODE: &str = "system-in";

/// Graph node holding hardware playback ports (sinks).
pub const SYSTEM_OUTPUT_NODE: &str = "system-out";
