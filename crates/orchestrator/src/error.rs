use std::fmt;

use serde_json::Value;
use switchboard_core::{Address, AddressError};
use thiserror::Error;

/// What kind of dispatch an error belongs to, as shown in log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Action,
    Listener,
    Workflow,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Action => "Action",
            Self::Listener => "Listener",
            Self::Workflow => "Workflow",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Address '{raw}' is invalid: {source}")]
    AddressFormat {
        raw: String,
        #[source]
        source: AddressError,
    },

    #[error("{kind} '{address}' not found")]
    ConnectorNotFound { kind: CallKind, address: Address },

    #[error("Workflow '{0}' not found")]
    WorkflowNotFound(Address),

    #[error("{kind} '{address}' failed")]
    RemoteFailure {
        kind: CallKind,
        address: Address,
        payload: Value,
    },

    #[error("{kind} '{address}' dropped the connection")]
    ConnectionDropped { kind: CallKind, address: Address },

    #[error("{kind} '{address}' sent an unreadable message: {message}")]
    InvalidMessage {
        kind: CallKind,
        address: Address,
        message: String,
    },
}

impl RuntimeError {
    pub fn address_format(raw: impl Into<String>, source: AddressError) -> Self {
        Self::AddressFormat {
            raw: raw.into(),
            source,
        }
    }

    /// Whether this error ends the call and fires its fail continuation.
    ///
    /// Dropped connections and unreadable frames are transient: they are
    /// logged and the connection layer carries on.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::ConnectionDropped { .. } | Self::InvalidMessage { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
