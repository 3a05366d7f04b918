//! Transport abstraction over the WebSocket connection.
//!
//! The connection manager only sees the `Connector` and `Transport`
//! traits. Production uses tokio-tungstenite; tests script their own
//! transports.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use vd_core::error::{VdError, VdResult};

/// A live, receive-only stream of text frames.
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next text frame.
    ///
    /// `None` means the connection ended cleanly. An error means the
    /// transport failed mid-session and should not be read again.
    async fn next_frame(&mut self) -> Option<VdResult<String>>;

    /// Close the connection.
    async fn close(&mut self);
}

/// Opens transports for the connection manager.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dial the endpoint and return a live transport.
    async fn connect(&self, url: &str) -> VdResult<Box<dyn Transport>>;
}

/// Production connector backed by tokio-tungstenite.
#[derive(Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> VdResult<Box<dyn Transport>> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| VdError::Socket(e.to_string()))?;
        debug!("websocket handshake complete (status {})", response.status());
        Ok(Box::new(WsTransport { inner: stream }))
    }
}

/// WebSocket-backed transport.
pub struct WsTransport {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn next_frame(&mut self) -> Option<VdResult<String>> {
        while let Some(message) = self.inner.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(_)) => return None,
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Pong replies are written by tungstenite itself.
                }
                Ok(_) => {
                    // Binary and raw frames are not part of the protocol.
                }
                Err(e) => return Some(Err(VdError::Socket(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}
