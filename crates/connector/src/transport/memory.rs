//! In-process transport.
//!
//! Every `connect` hands a [`MemorySession`] to whoever calls
//! [`MemoryTransport::accept`], which then plays the connector: it reads the
//! request, pushes replies and drops the session to simulate a disconnect.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::{Channel, Transport};
use crate::error::{ConnectorError, Result};
use crate::messages::{ClientMessage, ServerMessage};

#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    sessions_tx: mpsc::UnboundedSender<MemorySession>,
    sessions_rx: Mutex<mpsc::UnboundedReceiver<MemorySession>>,
    refusing: AtomicBool,
    connects: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MemoryInner {
                sessions_tx,
                sessions_rx: Mutex::new(sessions_rx),
                refusing: AtomicBool::new(false),
                connects: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait for the next client to connect.
    pub async fn accept(&self) -> Option<MemorySession> {
        self.inner.sessions_rx.lock().await.recv().await
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn set_refusing(&self, refusing: bool) {
        self.inner.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Number of connect attempts seen, refused ones included.
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("connect_count", &self.connect_count())
            .finish()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Channel>> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        if self.inner.refusing.load(Ordering::SeqCst) {
            return Err(ConnectorError::Connection(format!(
                "connection to {} refused",
                url
            )));
        }

        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();

        let session = MemorySession {
            url: url.to_string(),
            requests: requests_rx,
            replies: replies_tx,
        };
        self.inner
            .sessions_tx
            .send(session)
            .map_err(|_| ConnectorError::Closed)?;

        Ok(Box::new(MemoryChannel {
            requests: requests_tx,
            replies: replies_rx,
        }))
    }
}

/// The connector's end of one in-memory connection.
pub struct MemorySession {
    url: String,
    requests: mpsc::UnboundedReceiver<ClientMessage>,
    replies: mpsc::UnboundedSender<Result<ServerMessage>>,
}

impl MemorySession {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next request sent by the client, `None` once the client hung up.
    pub async fn request(&mut self) -> Option<ClientMessage> {
        self.requests.recv().await
    }

    /// Push a message to the client. Returns false if the client is gone.
    pub fn reply(&self, message: ServerMessage) -> bool {
        self.replies.send(Ok(message)).is_ok()
    }

    /// Push a frame the client cannot decode.
    pub fn reply_garbage(&self, text: &str) -> bool {
        self.replies
            .send(Err(ConnectorError::Protocol(text.to_string())))
            .is_ok()
    }

    /// Wait until the client closes its end.
    pub async fn closed(&mut self) {
        while self.requests.recv().await.is_some() {}
    }

    /// Hang up on the client.
    pub fn disconnect(self) {}
}

struct MemoryChannel {
    requests: mpsc::UnboundedSender<ClientMessage>,
    replies: mpsc::UnboundedReceiver<Result<ServerMessage>>,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        self.requests
            .send(message.clone())
            .map_err(|_| ConnectorError::Closed)
    }

    async fn recv(&mut self) -> Option<Result<ServerMessage>> {
        self.replies.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.replies.close();
        Ok(())
    }
}
