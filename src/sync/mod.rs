//! Address-tree synchronizer.
//!
//! Translates everything the runner sends into [`GraphModel`] mutations:
//!
//! - **Snapshots**: JSON namespace subtrees answering a state request,
//!   matched by `FULL_PATH` and walked top-down.
//! - **Leaf updates**: binary OSC messages carrying one address's new value.
//! - **Structural events**: `PATH_ADDED` / `PATH_REMOVED` / `PATH_RENAMED`
//!   text commands.
//!
//! Frames are applied strictly in arrival order. Nothing here suspends: when
//! an event calls for fresh state, the handler returns [`SyncRequest`]s and the
//! caller sends them.
//!
//! Addresses that do not match a known template are ignored. Updates naming
//! an instance or parameter the model does not hold yet are logged at debug
//! and dropped; the follow-up snapshot brings them in.

pub mod address;
mod leaf;
pub mod namespace;
mod snapshot;
mod structure;

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::Value;

pub use address::{InstancePath, ParamLeaf, RunnerAddress};
pub use namespace::{NamespaceNode, RangeSpec};

use crate::constants::{DEFAULT_INSTANCE_ADD_DELAY_MS, INITIAL_STATE_PATHS};
use crate::model::GraphModel;
use crate::osc::{self, OscError, OscMessage, OscPacket};

/// A namespace subtree the runner should be asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Absolute address to request.
    pub path: String,
    /// How long to wait before sending.
    pub delay: Duration,
}

impl SyncRequest {
    /// Request to send right away.
    pub fn now(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            delay: Duration::ZERO,
        }
    }

    /// Request to send after `delay`.
    pub fn after(path: impl Into<String>, delay: Duration) -> Self {
        Self {
            path: path.into(),
            delay,
        }
    }
}

/// Pending requests, deduplicated by path. The first entry for a path wins.
#[derive(Debug, Default)]
pub(crate) struct Requests(Vec<SyncRequest>);

impl Requests {
    pub(crate) fn push(&mut self, request: SyncRequest) {
        if !self.0.iter().any(|r| r.path == request.path) {
            self.0.push(request);
        }
    }

    pub(crate) fn into_vec(self) -> Vec<SyncRequest> {
        self.0
    }
}

/// Inbound frame that could not be applied.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Text frame was not valid JSON, or not a namespace node.
    #[error("malformed text frame: {0}")]
    Json(#[from] serde_json::Error),
    /// Binary frame was not a valid OSC packet.
    #[error("malformed OSC frame: {0}")]
    Osc(#[from] OscError),
}

/// Owns the model and applies inbound frames to it.
#[derive(Debug)]
pub struct Synchronizer {
    model: GraphModel,
    instance_add_delay: Duration,
    pending: BTreeSet<String>,
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_INSTANCE_ADD_DELAY_MS))
    }
}

impl Synchronizer {
    /// Empty model. New instances are requested `instance_add_delay` after
    /// the runner announces them.
    #[must_use]
    pub fn new(instance_add_delay: Duration) -> Self {
        Self {
            model: GraphModel::new(),
            instance_add_delay,
            pending: BTreeSet::new(),
        }
    }

    /// The mirrored state.
    #[must_use]
    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    /// Mutable model access for optimistic local edits.
    pub fn model_mut(&mut self) -> &mut GraphModel {
        &mut self.model
    }

    /// Start a full resync: every initial path becomes pending and is
    /// returned for sending.
    pub fn begin_initial_sync(&mut self) -> Vec<SyncRequest> {
        self.pending = INITIAL_STATE_PATHS.iter().map(|p| (*p).to_string()).collect();
        INITIAL_STATE_PATHS.iter().map(|p| SyncRequest::now(*p)).collect()
    }

    /// Whether every initial path has been answered.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.pending.is_empty()
    }

    /// Initial paths still unanswered.
    pub fn pending_paths(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    /// Stop waiting for the remaining initial paths.
    pub fn abandon_pending(&mut self) {
        self.pending.clear();
    }

    /// Apply a text frame: a snapshot or a structural command.
    pub fn handle_text(&mut self, text: &str) -> Result<Vec<SyncRequest>, SyncError> {
        let raw: Value = serde_json::from_str(text)?;

        if raw.get("FULL_PATH").is_some() {
            let node: NamespaceNode = serde_json::from_value(raw)?;
            return Ok(self.apply_snapshot(&node));
        }

        let command = raw.get("COMMAND").and_then(Value::as_str);
        let data = raw.get("DATA");
        let requests = match (command, data) {
            (Some("PATH_ADDED"), Some(Value::String(path))) => self.path_added(path),
            (Some("PATH_REMOVED"), Some(Value::String(path))) => self.path_removed(path),
            (Some("PATH_RENAMED"), Some(Value::Object(data))) => {
                let old = data.get("OLD").and_then(Value::as_str);
                let new = data.get("NEW").and_then(Value::as_str);
                match (old, new) {
                    (Some(old), Some(new)) => self.path_renamed(old, new),
                    _ => {
                        log::debug!("[Sync] PATH_RENAMED without OLD/NEW ignored");
                        Vec::new()
                    }
                }
            }
            (Some(other), _) => {
                log::debug!("[Sync] Ignoring command {}", other);
                Vec::new()
            }
            (None, _) => {
                log::debug!("[Sync] Ignoring text frame without FULL_PATH or COMMAND");
                Vec::new()
            }
        };
        Ok(requests)
    }

    /// Decode and apply a binary frame.
    pub fn handle_binary(&mut self, bytes: &[u8]) -> Result<Vec<SyncRequest>, SyncError> {
        let packet = osc::decode(bytes)?;
        Ok(self.apply_packet(&packet))
    }

    /// Apply a packet. Bundle contents are applied in listed order; the time
    /// tag is not used for scheduling.
    pub fn apply_packet(&mut self, packet: &OscPacket) -> Vec<SyncRequest> {
        let mut requests = Requests::default();
        match packet {
            OscPacket::Message(msg) => self.apply_leaf(msg, &mut requests),
            OscPacket::Bundle(bundle) => {
                log::trace!(
                    "[Sync] Bundle @{} with {} packets",
                    bundle.timetag.native(),
                    bundle.content.len()
                );
                for msg in bundle.messages() {
                    self.apply_leaf(msg, &mut requests);
                }
            }
        }
        requests.into_vec()
    }

    /// Apply one leaf update.
    pub fn apply_message(&mut self, msg: &OscMessage) -> Vec<SyncRequest> {
        let mut requests = Requests::default();
        self.apply_leaf(msg, &mut requests);
        requests.into_vec()
    }

    /// Apply a snapshot and mark any initial paths it covers as answered.
    pub fn apply_snapshot(&mut self, node: &NamespaceNode) -> Vec<SyncRequest> {
        let mut requests = Requests::default();
        log::debug!("[Sync] Snapshot {}", node.full_path);
        self.apply_node(node, &mut requests);

        let root = node.full_path.trim_end_matches('/');
        let prefix = format!("{root}/");
        self.pending
            .retain(|path| path != root && !path.starts_with(&prefix));
        requests.into_vec()
    }

    /// Apply a rename as a removal followed by an addition.
    pub fn path_renamed(&mut self, old: &str, new: &str) -> Vec<SyncRequest> {
        let mut requests = Requests::default();
        for request in self.path_removed(old).into_iter().chain(self.path_added(new)) {
            requests.push(request);
        }
        requests.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_sync_tracks_pending() {
        let mut sync = Synchronizer::default();
        let requests = sync.begin_initial_sync();
        assert_eq!(requests.len(), INITIAL_STATE_PATHS.len());
        assert!(!sync.is_synced());

        sync.handle_text(r#"{"FULL_PATH": "/rnbo/patchers", "CONTENTS": {}}"#)
            .unwrap();
        assert!(!sync.pending_paths().any(|p| p == "/rnbo/patchers"));

        // A full dump answers everything.
        sync.handle_text(r#"{"FULL_PATH": "/rnbo", "CONTENTS": {}}"#).unwrap();
        assert!(sync.is_synced());
    }

    #[test]
    fn test_malformed_text_is_an_error() {
        let mut sync = Synchronizer::default();
        assert!(matches!(sync.handle_text("{not json"), Err(SyncError::Json(_))));
        assert!(sync.handle_text(r#"{"COMMAND": "PATH_CHANGED", "DATA": "/x"}"#).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_binary_is_an_error() {
        let mut sync = Synchronizer::default();
        assert!(matches!(sync.handle_binary(b"/rnb"), Err(SyncError::Osc(_))));
    }

    #[test]
    fn test_requests_dedupe_by_path() {
        let mut requests = Requests::default();
        requests.push(SyncRequest::now("/a"));
        requests.push(SyncRequest::after("/a", Duration::from_secs(1)));
        requests.push(SyncRequest::now("/b"));
        assert_eq!(requests.into_vec(), vec![SyncRequest::now("/a"), SyncRequest::now("/b")]);
    }
}
