//! The seam between [`Connection`](crate::Connection) and the wire.

pub mod memory;
pub mod websocket;

use async_trait::async_trait;

use crate::error::Result;
use crate::messages::{ClientMessage, ServerMessage};

/// Opens channels to connector endpoints.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Channel>>;
}

/// One open bidirectional link to a connector.
#[async_trait]
pub trait Channel: Send {
    async fn send(&mut self, message: &ClientMessage) -> Result<()>;

    /// Next message from the connector. `None` means the peer hung up.
    ///
    /// Must be cancel safe: it is polled inside `select!`.
    async fn recv(&mut self) -> Option<Result<ServerMessage>>;

    async fn close(&mut self) -> Result<()>;
}
