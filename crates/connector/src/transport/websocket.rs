use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{Channel, Transport};
use crate::error::{ConnectorError, Result};
use crate::messages::{ClientMessage, ServerMessage};

/// JSON text frames over WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Channel>> {
        let (stream, response) = connect_async(url).await?;
        debug!(url = %url, status = %response.status(), "WebSocket connected");
        Ok(Box::new(WebSocketChannel { stream }))
    }
}

struct WebSocketChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Channel for WebSocketChannel {
    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.stream.send(Message::Text(json)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<ServerMessage>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(parse_frame(&text)),
                Ok(Message::Binary(data)) => {
                    return Some(match std::str::from_utf8(&data) {
                        Ok(text) => parse_frame(text),
                        Err(e) => Err(ConnectorError::Protocol(format!(
                            "binary frame is not UTF-8: {}",
                            e
                        ))),
                    })
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket closed by connector");
                    return None;
                }
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}

fn parse_frame(text: &str) -> Result<ServerMessage> {
    serde_json::from_str(text)
        .map_err(|e| ConnectorError::Protocol(format!("{} - data: {}", e, text)))
}
