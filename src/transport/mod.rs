//! Self-healing duplex transport to the runner.
//!
//! # Architecture
//!
//! ```text
//!   Transport (handle)                 background link task
//!         │                                    │
//!         │  send(bytes) ─── mpsc ──────────►  │  writer.send(frame)
//!         │                                    │
//!         │  subscribe() ◄── EventBus ───────  │  reader.recv() → Message
//!         │                                    │  drop/error → reconnect cycle
//!         ▼                                    ▼
//!   ConnectionState  {Closed, Connecting, Open}
//! ```
//!
//! # Lifecycle
//!
//! - [`Transport::connect`] runs the first attempt cycle and resolves once the
//!   link is `Open`, or fails after `max_retries` attempts. That failure is
//!   reported only through the returned error; no event is emitted for it.
//! - Any read error, write error, or remote close moves `Open → Connecting`,
//!   emits [`TransportEvent::Reconnecting`], and runs a fresh attempt cycle
//!   with the counter reset to 1.
//! - Exhausting the cycle moves to `Closed` and emits
//!   [`TransportEvent::ReconnectFailed`]; nothing retries until `connect` is
//!   called again.
//! - [`Transport::close`] is terminal: it suppresses reconnection and emits
//!   [`TransportEvent::Close`]. An attempt already in flight still completes,
//!   but its link is closed and discarded.
//!
//! Outbound frames are dropped, never queued, unless the state is `Open`.

pub mod events;
pub mod link;
pub mod memory;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

pub use events::{EventBus, TransportEvent};
pub use link::{Connector, Frame, LinkPair, LinkReader, LinkWriter, WsConnector};

use crate::constants::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_TIMEOUT_MS};

/// Connection state as observed by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// No link, and none being attempted.
    Closed = 0,
    /// An attempt cycle is outstanding.
    Connecting = 1,
    /// Link established; sends go through.
    Open = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Open,
            _ => Self::Closed,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
        };
        f.write_str(label)
    }
}

/// Bounded fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per cycle. Zero is treated as one.
    pub max_retries: u32,
    /// Delay between consecutive failed attempts.
    pub retry_timeout: Duration,
}

impl RetryPolicy {
    /// Build a policy.
    #[must_use]
    pub fn new(max_retries: u32, retry_timeout: Duration) -> Self {
        Self {
            max_retries,
            retry_timeout,
        }
    }

    /// Number of attempts one cycle makes.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            Duration::from_millis(DEFAULT_RETRY_TIMEOUT_MS),
        )
    }
}

/// Transport failures surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Every attempt in the cycle failed.
    #[error("reconnect failed after {attempts} attempts: {last_error}")]
    ReconnectFailed {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },
    /// The transport was closed deliberately.
    #[error("transport closed")]
    Closed,
    /// Another attempt cycle is already running.
    #[error("connection attempt already in progress")]
    AlreadyConnecting,
    /// The endpoint is not a `ws://` or `wss://` URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// State shared between the handle and the background link task.
#[derive(Debug)]
struct Shared {
    endpoint: String,
    policy: RetryPolicy,
    state: AtomicU8,
    shutdown: AtomicBool,
    events: EventBus,
    outbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = ConnectionState::from_u8(self.state.swap(state as u8, Ordering::SeqCst));
        if prev != state {
            log::debug!("[Transport] {} -> {}", prev, state);
        }
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn set_outbound(&self, tx: Option<mpsc::UnboundedSender<Frame>>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = tx;
    }
}

/// Handle to a reconnecting link.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Transport {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create a closed transport for `endpoint`.
    ///
    /// # Errors
    ///
    /// [`TransportError::InvalidEndpoint`] unless `endpoint` is a `ws://` or
    /// `wss://` URL with a host.
    pub fn new(
        endpoint: impl Into<String>,
        policy: RetryPolicy,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, TransportError> {
        let endpoint = endpoint.into();
        let host = endpoint
            .strip_prefix("ws://")
            .or_else(|| endpoint.strip_prefix("wss://"));
        if !host.is_some_and(|h| !h.is_empty()) {
            return Err(TransportError::InvalidEndpoint(endpoint));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                endpoint,
                policy,
                state: AtomicU8::new(ConnectionState::Closed as u8),
                shutdown: AtomicBool::new(false),
                events: EventBus::default(),
                outbound: Mutex::new(None),
            }),
            connector,
        })
    }

    /// Endpoint this transport connects to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Retry policy in effect.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.shared.policy
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether sends currently go through.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Subscribe to lifecycle events and inbound frames.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.shared.events.subscribe()
    }

    /// Run one attempt cycle and start the background link task.
    ///
    /// Resolves immediately if the link is already open. A failed cycle here
    /// emits nothing: the caller gets [`TransportError::ReconnectFailed`] and
    /// subscribers only hear about cycles run by the link task.
    ///
    /// # Errors
    ///
    /// - [`TransportError::ReconnectFailed`] once every attempt failed
    /// - [`TransportError::Closed`] after [`Self::close`]
    /// - [`TransportError::AlreadyConnecting`] while another cycle runs
    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.shared.is_shut_down() {
            return Err(TransportError::Closed);
        }
        let claimed = self.shared.state.compare_exchange(
            ConnectionState::Closed as u8,
            ConnectionState::Connecting as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        match claimed.map_err(ConnectionState::from_u8) {
            Ok(_) => {}
            Err(ConnectionState::Open) => return Ok(()),
            Err(_) => return Err(TransportError::AlreadyConnecting),
        }

        log::info!("[Transport] Connecting to {}", self.shared.endpoint);
        match attempt_cycle(&self.shared, self.connector.as_ref()).await {
            Ok((writer, reader)) => {
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                self.shared.set_outbound(Some(outbound_tx));
                self.shared.set_state(ConnectionState::Open);
                log::info!("[Transport] Connected to {}", self.shared.endpoint);

                tokio::spawn(run_link_loop(
                    Arc::clone(&self.shared),
                    Arc::clone(&self.connector),
                    writer,
                    reader,
                    outbound_rx,
                ));
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(ConnectionState::Closed);
                log::warn!("[Transport] {}", e);
                Err(e)
            }
        }
    }

    /// Send an encoded OSC packet.
    ///
    /// Returns `false` (and drops the frame) unless the link is `Open`.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        self.send_frame(Frame::Binary(bytes))
    }

    /// Send a text frame (OSCQuery state request).
    ///
    /// Returns `false` (and drops the frame) unless the link is `Open`.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send_frame(Frame::Text(text.into()))
    }

    fn send_frame(&self, frame: Frame) -> bool {
        if !self.is_open() {
            log::debug!("[Transport] Dropping outbound frame while {}", self.state());
            return false;
        }
        self.shared
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| tx.send(frame).is_ok())
    }

    /// Close the transport for good.
    ///
    /// Idempotent. Emits [`TransportEvent::Close`] the first time.
    pub fn close(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("[Transport] Closing connection to {}", self.shared.endpoint);
        self.shared.set_state(ConnectionState::Closed);
        // Dropping the sender ends the link task's outbound stream.
        self.shared.set_outbound(None);
        self.shared.events.emit(&TransportEvent::Close);
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Make up to `policy.attempts()` connection attempts.
async fn attempt_cycle(
    shared: &Shared,
    connector: &dyn Connector,
) -> Result<LinkPair, TransportError> {
    let attempts = shared.policy.attempts();
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if shared.is_shut_down() {
            return Err(TransportError::Closed);
        }
        log::debug!(
            "[Transport] Attempt {}/{} to {}",
            attempt,
            attempts,
            shared.endpoint
        );

        match connector.connect(&shared.endpoint).await {
            Ok((mut writer, reader)) => {
                if shared.is_shut_down() {
                    let _ = writer.close().await;
                    return Err(TransportError::Closed);
                }
                return Ok((writer, reader));
            }
            Err(e) => {
                last_error = format!("{e:#}");
                log::warn!(
                    "[Transport] Attempt {}/{} failed: {}",
                    attempt,
                    attempts,
                    last_error
                );
                if attempt < attempts {
                    tokio::time::sleep(shared.policy.retry_timeout).await;
                }
            }
        }
    }

    Err(TransportError::ReconnectFailed {
        attempts,
        last_error,
    })
}

/// Result of one open session.
enum SessionExit {
    /// `close()` was called.
    Shutdown,
    /// The link failed or the runner went away.
    Dropped(String),
}

/// Owns the link for its whole life, including every reconnect cycle.
async fn run_link_loop(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    mut writer: Box<dyn LinkWriter>,
    mut reader: Box<dyn LinkReader>,
    mut outbound_rx: mpsc::UnboundedReceiver<Frame>,
) {
    loop {
        let exit = run_session(&shared, writer.as_mut(), reader.as_mut(), &mut outbound_rx).await;

        if let SessionExit::Dropped(reason) = &exit {
            log::warn!("[Transport] Link dropped: {}", reason);
        }
        if matches!(exit, SessionExit::Shutdown) || shared.is_shut_down() {
            let _ = writer.close().await;
            log::info!("[Transport] Link task exiting");
            return;
        }

        shared.set_state(ConnectionState::Connecting);
        shared.events.emit(&TransportEvent::Reconnecting);

        // Frames queued against the dead link are stale.
        let mut stale = 0usize;
        while outbound_rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            log::debug!("[Transport] Dropped {} stale outbound frames", stale);
        }

        match attempt_cycle(&shared, connector.as_ref()).await {
            Ok((new_writer, new_reader)) => {
                writer = new_writer;
                reader = new_reader;
                shared.set_state(ConnectionState::Open);
                log::info!("[Transport] Reconnected to {}", shared.endpoint);
                shared.events.emit(&TransportEvent::Reconnect);
            }
            Err(TransportError::ReconnectFailed { last_error, .. }) => {
                shared.set_state(ConnectionState::Closed);
                shared.set_outbound(None);
                log::error!("[Transport] Giving up on {}: {}", shared.endpoint, last_error);
                shared
                    .events
                    .emit(&TransportEvent::ReconnectFailed(last_error));
                return;
            }
            Err(_) => return,
        }
    }
}

/// Pump frames in both directions until the link fails or shutdown.
async fn run_session(
    shared: &Shared,
    writer: &mut dyn LinkWriter,
    reader: &mut dyn LinkReader,
    outbound_rx: &mut mpsc::UnboundedReceiver<Frame>,
) -> SessionExit {
    loop {
        if shared.is_shut_down() {
            return SessionExit::Shutdown;
        }

        tokio::select! {
            inbound = reader.recv() => match inbound {
                Some(Ok(frame)) => shared.events.emit(&TransportEvent::Message(frame)),
                Some(Err(e)) => return SessionExit::Dropped(format!("{e:#}")),
                None => return SessionExit::Dropped("closed by runner".to_string()),
            },
            outbound = outbound_rx.recv() => match outbound {
                Some(frame) => {
                    if let Err(e) = writer.send(frame).await {
                        return SessionExit::Dropped(format!("{e:#}"));
                    }
                }
                None => return SessionExit::Shutdown,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_retries_still_attempts_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts(), 1);
        assert_eq!(RetryPolicy::default().attempts(), 10);
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let (connector, _accept) = memory::MemoryConnector::new();
        let err = Transport::new("http://runner:5678", RetryPolicy::default(), connector)
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_send_dropped_while_closed() {
        let (connector, _accept) = memory::MemoryConnector::new();
        let transport =
            Transport::new("ws://runner:5678", RetryPolicy::default(), connector).unwrap();
        assert_eq!(transport.state(), ConnectionState::Closed);
        assert!(!transport.send(vec![1, 2, 3]));
        assert!(!transport.send_text("/rnbo/inst"));
    }

    #[tokio::test]
    async fn test_connect_after_close_is_rejected() {
        let (connector, _accept) = memory::MemoryConnector::new();
        let transport =
            Transport::new("ws://runner:5678", RetryPolicy::default(), connector).unwrap();
        let mut events = transport.subscribe();
        transport.close();
        transport.close();

        assert_eq!(transport.connect().await, Err(TransportError::Closed));
        assert_eq!(events.try_recv().unwrap(), TransportEvent::Close);
        assert!(events.try_recv().is_err());
    }
}
