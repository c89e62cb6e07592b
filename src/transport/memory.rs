//! In-memory link backed by tokio channels.
//!
//! Lets tests and offline tooling play the runner's side of a connection
//! without a socket: every accepted connection surfaces as a [`RemoteEnd`],
//! and failures can be scripted per attempt.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::link::{Connector, Frame, LinkPair, LinkReader, LinkWriter};

/// Scriptable connector whose links are channel pairs.
#[derive(Debug)]
pub struct MemoryConnector {
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    refuse_all: AtomicBool,
    accept_tx: mpsc::UnboundedSender<RemoteEnd>,
}

/// The runner's side of an accepted in-memory connection.
///
/// Dropping it closes the link, which the transport sees as an abrupt remote
/// close.
#[derive(Debug)]
pub struct RemoteEnd {
    to_client: mpsc::UnboundedSender<Frame>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryConnector {
    /// New connector plus the stream of accepted connections.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            attempts: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
            refuse_all: AtomicBool::new(false),
            accept_tx,
        });
        (connector, accept_rx)
    }

    /// Refuse the next `count` attempts.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Refuse every attempt until switched off again.
    pub fn refuse_all(&self, refuse: bool) {
        self.refuse_all.store(refuse, Ordering::SeqCst);
    }

    /// Total attempts made so far, successful or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn should_refuse(&self) -> bool {
        if self.refuse_all.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &str) -> Result<LinkPair> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.should_refuse() {
            return Err(anyhow!("connection refused by {endpoint} (attempt {attempt})"));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        self.accept_tx
            .send(RemoteEnd {
                to_client,
                from_client,
            })
            .map_err(|e| anyhow!("no listener for {endpoint}: {e}"))?;

        Ok((
            Box::new(MemoryWriter {
                tx: Some(client_tx),
            }),
            Box::new(MemoryReader { rx: client_rx }),
        ))
    }
}

impl RemoteEnd {
    /// Push a binary frame to the client.
    pub fn send_binary(&self, data: Vec<u8>) -> bool {
        self.to_client.send(Frame::Binary(data)).is_ok()
    }

    /// Push a text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(Frame::Text(text.into())).is_ok()
    }

    /// Next frame the client sent, or `None` once it closed its writer.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    /// Frame the client already sent, without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.from_client.try_recv().ok()
    }
}

#[derive(Debug)]
struct MemoryWriter {
    tx: Option<mpsc::UnboundedSender<Frame>>,
}

#[async_trait]
impl LinkWriter for MemoryWriter {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let tx = self.tx.as_ref().ok_or_else(|| anyhow!("memory link closed"))?;
        tx.send(frame)
            .map_err(|e| anyhow!("memory link peer gone: {e}"))
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl LinkReader for MemoryReader {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        self.rx.recv().await.map(Ok)
    }
}
