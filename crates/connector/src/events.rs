use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::messages::ServerMessage;

/// Names of the events a [`Connection`](crate::Connection) emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Close,
    Retry,
    Error,
    Return,
    StartWorkflow,
    Fail,
    Log,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        Self::Open,
        Self::Close,
        Self::Retry,
        Self::Error,
        Self::Return,
        Self::StartWorkflow,
        Self::Fail,
        Self::Log,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Retry => "retry",
            Self::Error => "error",
            Self::Return => "return",
            Self::StartWorkflow => "start_workflow",
            Self::Fail => "fail",
            Self::Log => "log",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Transport established.
    Open,
    /// Transport ended. `expected` is true only after an explicit close.
    Close { expected: bool },
    /// About to reconnect after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Transport-level problem. Not terminal by itself. `protocol` is set
    /// when a frame could not be decoded and the transport is still up.
    Error { message: String, protocol: bool },
    /// Action completed.
    Return(Value),
    /// A subscribed trigger fired.
    StartWorkflow(Value),
    /// The connector reported failure.
    Fail(Value),
    /// Structured log passthrough from the connector.
    Log(Value),
}

impl ConnectionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Close { .. } => EventKind::Close,
            Self::Retry { .. } => EventKind::Retry,
            Self::Error { .. } => EventKind::Error,
            Self::Return(_) => EventKind::Return,
            Self::StartWorkflow(_) => EventKind::StartWorkflow,
            Self::Fail(_) => EventKind::Fail,
            Self::Log(_) => EventKind::Log,
        }
    }

    /// Data carried by connector-originated events.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Return(v) | Self::StartWorkflow(v) | Self::Fail(v) | Self::Log(v) => Some(v),
            _ => None,
        }
    }
}

impl From<ServerMessage> for ConnectionEvent {
    fn from(message: ServerMessage) -> Self {
        match message {
            ServerMessage::Return { payload } => Self::Return(payload),
            ServerMessage::StartWorkflow { payload } => Self::StartWorkflow(payload),
            ServerMessage::Fail { payload } => Self::Fail(payload),
            ServerMessage::Log { payload } => Self::Log(payload),
        }
    }
}
