//! Link abstraction beneath the transport.
//!
//! A [`Connector`] opens one physical link and hands back independent
//! writer/reader halves. The production connector is [`WsConnector`]; tests
//! drive the retry machine through [`super::memory::MemoryConnector`].

use anyhow::Result;
use async_trait::async_trait;

/// A single application frame on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// OSCQuery JSON, or a bare-path state request.
    Text(String),
    /// Encoded OSC packet.
    Binary(Vec<u8>),
}

/// Writer half of an open link.
#[async_trait]
pub trait LinkWriter: Send {
    /// Write one frame.
    async fn send(&mut self, frame: Frame) -> Result<()>;

    /// Close the link from our side.
    async fn close(&mut self) -> Result<()>;
}

/// Reader half of an open link.
#[async_trait]
pub trait LinkReader: Send {
    /// Next inbound frame, or `None` once the peer has closed the link.
    async fn recv(&mut self) -> Option<Result<Frame>>;
}

/// Writer and reader halves of a freshly opened link.
pub type LinkPair = (Box<dyn LinkWriter>, Box<dyn LinkReader>);

/// Opens links to an endpoint. One call is one connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Attempt to open a link to `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<LinkPair>;
}

/// Connector for real runners over WebSocket.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<LinkPair> {
        let (writer, reader) = crate::ws::connect(endpoint).await?;
        Ok((Box::new(writer), Box::new(reader)))
    }
}

