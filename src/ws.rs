//! WebSocket link to a runner.
//!
//! The runner speaks two channels over one socket: binary frames carry OSC
//! packets, text frames carry OSCQuery JSON (namespace snapshots, structural
//! events, and the bare-path state requests the bridge sends). This module
//! maps `tokio-tungstenite` messages onto [`Frame`]s and hides control frames;
//! tungstenite answers pings on its own.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::transport::{Frame, LinkReader, LinkWriter};

/// Upper bound on the TCP connect plus handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Write half of a runner socket.
#[derive(Debug)]
pub struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

/// Read half of a runner socket.
#[derive(Debug)]
pub struct WsReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl LinkWriter for WsWriter {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
        };
        self.sink.send(message).await.context("WebSocket send failed")
    }

    async fn close(&mut self) -> Result<()> {
        // The peer may already be gone; closing the sink is what matters.
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            log::debug!("[Ws] Close frame not sent: {}", e);
        }
        self.sink.close().await.context("WebSocket close failed")
    }
}

#[async_trait]
impl LinkReader for WsReader {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(data)) => return Some(Ok(Frame::Binary(data))),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Ok(Message::Close(close)) => {
                    match close {
                        Some(frame) => log::debug!(
                            "[Ws] Close frame from runner: {} {}",
                            u16::from(frame.code),
                            frame.reason
                        ),
                        None => log::debug!("[Ws] Close frame from runner"),
                    }
                    return None;
                }
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(e) => return Some(Err(anyhow!("WebSocket read error: {e}"))),
            }
        }
    }
}

/// Open a socket to `url` and split it.
///
/// # Errors
///
/// Returns an error if the URL is invalid, the handshake fails, or it takes
/// longer than five seconds.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    use tungstenite::client::IntoClientRequest;

    let request = url
        .into_client_request()
        .with_context(|| format!("invalid WebSocket URL: {url}"))?;

    let (socket, _response) =
        tokio::time::timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_elapsed| anyhow!("WebSocket handshake with {url} timed out"))?
            .with_context(|| format!("WebSocket connect to {url} failed"))?;

    let (sink, stream) = socket.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Runner endpoint for a configured host and port.
///
/// Accepts a bare host or one carrying an `http(s)://` or `ws(s)://` scheme;
/// HTTP schemes map to their WebSocket counterparts.
#[must_use]
pub fn endpoint_url(host: &str, port: u16) -> String {
    let host = host.trim().trim_end_matches('/');
    let (scheme, bare) = [
        ("wss://", "wss"),
        ("https://", "wss"),
        ("ws://", "ws"),
        ("http://", "ws"),
    ]
    .iter()
    .find_map(|(prefix, scheme)| host.strip_prefix(prefix).map(|rest| (*scheme, rest)))
    .unwrap_or(("ws", host));
    format!("{scheme}://{bare}:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_plain_host() {
        assert_eq!(endpoint_url("c74rpi.local", 5678), "ws://c74rpi.local:5678");
    }

    #[test]
    fn test_endpoint_url_maps_schemes() {
        assert_eq!(endpoint_url("http://10.0.0.2/", 5678), "ws://10.0.0.2:5678");
        assert_eq!(endpoint_url("https://runner.example", 443), "wss://runner.example:443");
        assert_eq!(endpoint_url("wss://runner.example", 9000), "wss://runner.example:9000");
    }

    #[tokio::test]
    async fn test_connect_invalid_url_returns_error() {
        assert!(connect("not-a-url").await.is_err());
    }

    #[tokio::test]
    async fn test_connect_unreachable_host_returns_error() {
        assert!(connect("ws://127.0.0.1:1").await.is_err());
    }
}
