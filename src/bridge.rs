//! Bridge - the Transport + Synchronizer pair an application drives.
//!
//! The bridge is constructed explicitly and owned by the caller; there is no
//! process-wide instance. It owns the transport handle, the synchronizer (and
//! through it the model), and the application status machine.
//!
//! # Event loop
//!
//! ```text
//!   Transport ── TransportEvent ──► Bridge::next_event ──► Synchronizer
//!       ▲                                │                      │
//!       │                                │ BridgeEvent          │ SyncRequest
//!       └──── state requests ◄───────────┴──────────────────────┘
//! ```
//!
//! Callers loop on [`Bridge::next_event`]. Every inbound frame is applied
//! before the call returns, so the model read through [`Bridge::model`] is
//! always consistent with the last event seen. Delayed state requests and
//! the initial-sync deadline are serviced inside the same loop.
//!
//! # Status
//!
//! ```text
//!   Connecting ──► InitializingState ──► Ready
//!                                          │ link dropped
//!                                          ▼
//!          Closed ◄── (cycle exhausted) ── Reconnecting
//!                                          │ reconnected
//!                                          ▼
//!                                    ResyncingState ──► Ready
//! ```
//!
//! `Error` is reported when the first connect fails; `Closed` after
//! [`Bridge::close`] or an exhausted reconnect cycle.
//!
//! # Local edits
//!
//! Parameter edits are applied to the model as provisional before the runner
//! confirms them. The next authoritative update for the same parameter
//! replaces the provisional value outright.

// Rust guideline compliant 2025-01

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::commands::{Command, CommandError};
use crate::config::Config;
use crate::constants::INITIAL_SYNC_TIMEOUT;
use crate::model::{GraphModel, ParameterKey};
use crate::sync::{SyncError, SyncRequest, Synchronizer};
use crate::transport::{
    ConnectionState, Connector, Frame, RetryPolicy, Transport, TransportError, TransportEvent,
    WsConnector,
};

/// Connectivity and sync status, as an application would show it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppStatus {
    /// First connection attempt cycle in progress.
    Connecting,
    /// Connected; waiting for the initial state.
    InitializingState,
    /// State mirrored; live updates flowing.
    Ready,
    /// The link dropped and a reconnect cycle is running.
    Reconnecting,
    /// Reconnected; waiting for the state to be re-sent.
    ResyncingState,
    /// Closed deliberately, or reconnecting gave up.
    Closed,
    /// The first connect failed.
    Error(String),
}

impl AppStatus {
    /// Whether the bridge is waiting on initial state.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        matches!(self, Self::InitializingState | Self::ResyncingState)
    }

    /// Whether nothing more happens until `connect` is called.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Error(_))
    }
}

impl std::fmt::Display for AppStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::InitializingState => f.write_str("initializing state"),
            Self::Ready => f.write_str("ready"),
            Self::Reconnecting => f.write_str("reconnecting"),
            Self::ResyncingState => f.write_str("resyncing state"),
            Self::Closed => f.write_str("closed"),
            Self::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// What [`Bridge::next_event`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// The status changed.
    StatusChanged(AppStatus),
    /// An inbound frame was applied to the model.
    ModelUpdated,
}

/// Explicitly constructed Transport + Synchronizer pair.
#[derive(Debug)]
pub struct Bridge {
    transport: Transport,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    sync: Synchronizer,
    status: AppStatus,
    delayed: Vec<(Instant, String)>,
    sync_deadline: Option<Instant>,
    sync_timeout: Duration,
}

impl Bridge {
    /// Bridge to the runner named by `config`, over WebSocket.
    ///
    /// # Errors
    ///
    /// [`TransportError::InvalidEndpoint`] if the configured host and port do
    /// not form a usable URL.
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        Self::with_connector(
            config.endpoint(),
            config.retry_policy(),
            config.instance_add_delay(),
            Arc::new(WsConnector),
        )
    }

    /// Bridge over an arbitrary connector.
    ///
    /// # Errors
    ///
    /// [`TransportError::InvalidEndpoint`] for a non-`ws://` endpoint.
    pub fn with_connector(
        endpoint: impl Into<String>,
        policy: RetryPolicy,
        instance_add_delay: Duration,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, TransportError> {
        let transport = Transport::new(endpoint, policy, connector)?;
        // Subscribe before anything can be emitted.
        let events = transport.subscribe();
        Ok(Self {
            transport,
            events,
            sync: Synchronizer::new(instance_add_delay),
            status: AppStatus::Closed,
            delayed: Vec::new(),
            sync_deadline: None,
            sync_timeout: INITIAL_SYNC_TIMEOUT,
        })
    }

    /// Override how long to wait for initial state before reporting `Ready`.
    #[must_use]
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    // === Accessors ===

    /// The mirrored runner state.
    #[must_use]
    pub fn model(&self) -> &GraphModel {
        self.sync.model()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> &AppStatus {
        &self.status
    }

    /// Underlying transport state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Endpoint in use.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    // === Lifecycle ===

    /// Connect and request the initial state.
    ///
    /// Resolves once the link is open; state arrives through
    /// [`Self::next_event`].
    ///
    /// # Errors
    ///
    /// Whatever [`Transport::connect`] returns. The status becomes
    /// [`AppStatus::Error`].
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        self.status = AppStatus::Connecting;
        log::info!("[Bridge] Connecting to {}", self.transport.endpoint());

        if let Err(e) = self.transport.connect().await {
            log::warn!("[Bridge] Connect failed: {}", e);
            self.status = AppStatus::Error(e.to_string());
            return Err(e);
        }

        self.status = AppStatus::InitializingState;
        self.request_initial_state();
        Ok(())
    }

    /// Close the link for good.
    pub fn close(&mut self) {
        self.transport.close();
        self.delayed.clear();
        self.sync_deadline = None;
        self.set_status(AppStatus::Closed);
    }

    /// Wait for the next thing worth telling the application about.
    ///
    /// Returns `None` while closed or failed once every queued event has been
    /// drained. [`Self::connect`] starts things moving again.
    pub async fn next_event(&mut self) -> Option<BridgeEvent> {
        loop {
            if self.status.is_terminal() && self.events.is_empty() {
                return None;
            }
            let next_delayed = self.delayed.iter().map(|(at, _)| *at).min();
            let sync_deadline = self.sync_deadline;

            tokio::select! {
                event = self.events.recv() => {
                    let event = event?;
                    if let Some(out) = self.handle_transport_event(event) {
                        return Some(out);
                    }
                }
                () = sleep_until(next_delayed) => self.send_due_requests(),
                () = sleep_until(sync_deadline) => {
                    if let Some(out) = self.initial_sync_timed_out() {
                        return Some(out);
                    }
                }
            }
        }
    }

    /// Drive the event loop until `Ready` or `Closed`.
    ///
    /// Returns the status reached.
    pub async fn wait_ready(&mut self) -> AppStatus {
        if !self.status.is_syncing() {
            return self.status.clone();
        }
        while let Some(event) = self.next_event().await {
            if let BridgeEvent::StatusChanged(status) = event {
                if !status.is_syncing() {
                    return status;
                }
            }
        }
        self.status.clone()
    }

    // === Commands ===

    /// Send a command as-is.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotConnected`] unless the link is open. The command is
    /// dropped, never queued.
    pub fn send(&self, command: &Command) -> Result<(), CommandError> {
        if !self.transport.is_open() {
            log::debug!("[Bridge] Not connected; dropping {:?}", command);
            return Err(CommandError::NotConnected);
        }
        if !self.transport.send(command.to_bytes()) {
            return Err(CommandError::NotConnected);
        }
        log::debug!("[Bridge] Sent {:?}", command);
        Ok(())
    }

    /// Load a graph set.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotConnected`].
    pub fn load_set(&self, name: &str) -> Result<(), CommandError> {
        self.send(&Command::LoadSet(name.to_string()))
    }

    /// Save the current graph as a set.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotConnected`].
    pub fn save_set(&self, name: &str) -> Result<(), CommandError> {
        self.send(&Command::SaveSet(name.to_string()))
    }

    /// Delete a graph set.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotConnected`].
    pub fn destroy_set(&self, name: &str) -> Result<(), CommandError> {
        self.send(&Command::DestroySet(name.to_string()))
    }

    /// Rename a graph set.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotConnected`].
    pub fn rename_set(&self, old: &str, new: &str) -> Result<(), CommandError> {
        self.send(&Command::RenameSet {
            old: old.to_string(),
            new: new.to_string(),
        })
    }

    /// Set a parameter's value, showing it locally right away.
    ///
    /// # Errors
    ///
    /// [`CommandError::UnknownParameter`] or [`CommandError::NotConnected`];
    /// the model is untouched in both cases.
    pub fn set_parameter_value(&mut self, key: ParameterKey, value: f64) -> Result<(), CommandError> {
        let param = self
            .model()
            .parameter(key)
            .ok_or(CommandError::UnknownParameter(key))?;
        let normalized = param.normalize(value);
        self.send(&Command::SetParameterValue {
            path: param.path.clone(),
            value,
        })?;
        self.apply_provisional(key, normalized);
        Ok(())
    }

    /// Set a parameter's normalized value, showing it locally right away.
    ///
    /// # Errors
    ///
    /// [`CommandError::UnknownParameter`] or [`CommandError::NotConnected`];
    /// the model is untouched in both cases.
    pub fn set_parameter_normalized(
        &mut self,
        key: ParameterKey,
        normalized: f64,
    ) -> Result<(), CommandError> {
        let param = self
            .model()
            .parameter(key)
            .ok_or(CommandError::UnknownParameter(key))?;
        self.send(&Command::SetParameterNormalized {
            path: param.path.clone(),
            normalized,
        })?;
        self.apply_provisional(key, normalized);
        Ok(())
    }

    /// Connect two graph ports, after checking the pair locally.
    ///
    /// The model is not changed; the connection appears once the runner
    /// reports it.
    ///
    /// # Errors
    ///
    /// [`CommandError::InvalidConnection`] if validation fails, otherwise
    /// [`CommandError::NotConnected`].
    pub fn connect_ports(&self, source: &str, sink: &str) -> Result<(), CommandError> {
        let (source, sink) = self.jack_pair(source, sink)?;
        self.send(&Command::ConnectPorts { source, sink })
    }

    /// Disconnect two graph ports.
    ///
    /// # Errors
    ///
    /// As [`Self::connect_ports`].
    pub fn disconnect_ports(&self, source: &str, sink: &str) -> Result<(), CommandError> {
        let (source, sink) = self.jack_pair(source, sink)?;
        self.send(&Command::DisconnectPorts { source, sink })
    }

    /// Load a preset into an instance.
    ///
    /// # Errors
    ///
    /// [`CommandError::UnknownInstance`] or [`CommandError::NotConnected`].
    pub fn load_preset(&self, instance: u32, name: &str) -> Result<(), CommandError> {
        if self.model().instance(instance).is_none() {
            return Err(CommandError::UnknownInstance(instance));
        }
        self.send(&Command::LoadPreset {
            instance,
            name: name.to_string(),
        })
    }

    /// Map a file to an instance buffer; an empty name unmaps it.
    ///
    /// # Errors
    ///
    /// [`CommandError::UnknownInstance`], [`CommandError::UnknownDataRef`] or
    /// [`CommandError::NotConnected`].
    pub fn set_data_ref(&self, instance: u32, name: &str, file: &str) -> Result<(), CommandError> {
        let record = self
            .model()
            .instance(instance)
            .ok_or(CommandError::UnknownInstance(instance))?;
        if !record.data_refs.contains_key(name) {
            return Err(CommandError::UnknownDataRef {
                instance,
                name: name.to_string(),
            });
        }
        self.send(&Command::SetDataRef {
            instance,
            name: name.to_string(),
            file: file.to_string(),
        })
    }

    /// Start or stop the stream recorder.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotConnected`].
    pub fn set_recording(&self, active: bool) -> Result<(), CommandError> {
        self.send(&Command::SetRecording(active))
    }

    // === Internals ===

    fn set_status(&mut self, status: AppStatus) -> Option<BridgeEvent> {
        if self.status == status {
            return None;
        }
        log::info!("[Bridge] Status: {} -> {}", self.status, status);
        self.status = status.clone();
        Some(BridgeEvent::StatusChanged(status))
    }

    fn handle_transport_event(&mut self, event: TransportEvent) -> Option<BridgeEvent> {
        match event {
            TransportEvent::Message(frame) => self.handle_frame(&frame),
            TransportEvent::Reconnecting => {
                self.delayed.clear();
                self.sync_deadline = None;
                self.set_status(AppStatus::Reconnecting)
            }
            TransportEvent::Reconnect => {
                // Connections may have changed while away; the resync
                // reports the current ones.
                self.sync.model_mut().clear_links();
                let event = self.set_status(AppStatus::ResyncingState);
                self.request_initial_state();
                event
            }
            TransportEvent::ReconnectFailed(reason) => {
                log::warn!("[Bridge] Gave up reconnecting: {}", reason);
                self.sync_deadline = None;
                self.set_status(AppStatus::Closed)
            }
            TransportEvent::Close => {
                self.sync_deadline = None;
                self.set_status(AppStatus::Closed)
            }
        }
    }

    fn handle_frame(&mut self, frame: &Frame) -> Option<BridgeEvent> {
        let result: Result<Vec<SyncRequest>, SyncError> = match frame {
            Frame::Text(text) => self.sync.handle_text(text),
            Frame::Binary(bytes) => self.sync.handle_binary(bytes),
        };
        let requests = match result {
            Ok(requests) => requests,
            Err(e) => {
                log::warn!("[Bridge] Dropping frame: {}", e);
                return None;
            }
        };
        for request in requests {
            self.schedule(request);
        }

        if self.status.is_syncing() && self.sync.is_synced() {
            self.sync_deadline = None;
            return self.set_status(AppStatus::Ready);
        }
        Some(BridgeEvent::ModelUpdated)
    }

    fn request_initial_state(&mut self) {
        for request in self.sync.begin_initial_sync() {
            self.schedule(request);
        }
        self.sync_deadline = Some(Instant::now() + self.sync_timeout);
    }

    fn schedule(&mut self, request: SyncRequest) {
        if request.delay.is_zero() {
            self.request(&request.path);
        } else {
            log::debug!("[Bridge] Requesting {} in {:?}", request.path, request.delay);
            self.delayed.push((Instant::now() + request.delay, request.path));
        }
    }

    fn request(&self, path: &str) {
        if self.transport.send_text(path) {
            log::debug!("[Bridge] Requested {}", path);
        }
    }

    fn send_due_requests(&mut self) {
        let now = Instant::now();
        let (due, later): (Vec<_>, Vec<_>) = self.delayed.drain(..).partition(|(at, _)| *at <= now);
        self.delayed = later;
        for (_, path) in due {
            self.request(&path);
        }
    }

    fn initial_sync_timed_out(&mut self) -> Option<BridgeEvent> {
        self.sync_deadline = None;
        if !self.status.is_syncing() {
            return None;
        }
        let missing: Vec<&str> = self.sync.pending_paths().collect();
        log::warn!(
            "[Bridge] No answer for {} after {:?}; continuing without",
            missing.join(", "),
            self.sync_timeout
        );
        self.sync.abandon_pending();
        self.set_status(AppStatus::Ready)
    }

    fn apply_provisional(&mut self, key: ParameterKey, normalized: f64) {
        if let Some(param) = self.sync.model_mut().parameter_mut(key) {
            param.set_provisional_normalized(normalized);
        }
    }

    fn jack_pair(&self, source: &str, sink: &str) -> Result<(String, String), CommandError> {
        let model = self.model();
        model.validate_connection(source, sink)?;
        match (model.jack_name_for(source), model.jack_name_for(sink)) {
            (Some(source), Some(sink)) => Ok((source.to_string(), sink.to_string())),
            (None, _) => Err(crate::model::ConnectionError::UnknownPort(source.to_string()).into()),
            (_, None) => Err(crate::model::ConnectionError::UnknownPort(sink.to_string()).into()),
        }
    }
}

/// Sleep until `deadline`, or forever without one.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryConnector;

    fn bridge() -> Bridge {
        let (connector, _accepted) = MemoryConnector::new();
        Bridge::with_connector(
            "ws://runner.test:5678",
            RetryPolicy::new(1, Duration::from_millis(10)),
            Duration::from_millis(50),
            connector,
        )
        .unwrap()
    }

    #[test]
    fn test_status_display() {
        assert_eq!(AppStatus::ResyncingState.to_string(), "resyncing state");
        assert_eq!(AppStatus::Error("boom".into()).to_string(), "error: boom");
    }

    #[test]
    fn test_send_while_closed_is_dropped() {
        let bridge = bridge();
        assert_eq!(bridge.load_set("Factory"), Err(CommandError::NotConnected));
    }

    #[test]
    fn test_unknown_parameter_rejected_before_send() {
        let mut bridge = bridge();
        let key = ParameterKey::new(0, 3);
        assert_eq!(
            bridge.set_parameter_normalized(key, 0.5),
            Err(CommandError::UnknownParameter(key))
        );
    }

    #[test]
    fn test_set_status_reports_changes_only() {
        let mut bridge = bridge();
        assert_eq!(bridge.set_status(AppStatus::Closed), None);
        assert_eq!(
            bridge.set_status(AppStatus::Ready),
            Some(BridgeEvent::StatusChanged(AppStatus::Ready))
        );
    }
}
