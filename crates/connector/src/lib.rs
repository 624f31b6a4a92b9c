//! Client side of the connector protocol.
//!
//! A [`Connection`] owns one logical call or subscription against a connector
//! endpoint, reconnects after unexpected drops and reports what happens through
//! a fixed vocabulary of [`ConnectionEvent`]s.

pub mod connection;
pub mod error;
pub mod events;
pub mod messages;
pub mod policy;
pub mod transport;

pub use connection::{Connection, ConnectionHandle, ConnectionState, EventHandler};
pub use error::{ConnectorError, Result};
pub use events::{ConnectionEvent, EventKind};
pub use messages::{ClientMessage, ServerMessage};
pub use policy::ReconnectPolicy;
pub use transport::memory::{MemorySession, MemoryTransport};
pub use transport::websocket::WebSocketTransport;
pub use transport::{Channel, Transport};
