use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Requests sent to a connector. One per (re)connect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Action {
        id: String,
        params: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<Value>,
    },
    Listen {
        id: String,
        params: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<Value>,
    },
}

impl ClientMessage {
    /// One-shot requests must reach the connector at most once.
    pub fn is_action(&self) -> bool {
        matches!(self, Self::Action { .. })
    }

    pub fn local_id(&self) -> &str {
        match self {
            Self::Action { id, .. } | Self::Listen { id, .. } => id,
        }
    }

    pub fn params(&self) -> &Value {
        match self {
            Self::Action { params, .. } | Self::Listen { params, .. } => params,
        }
    }

    pub fn credentials(&self) -> Option<&Value> {
        match self {
            Self::Action { credentials, .. } | Self::Listen { credentials, .. } => {
                credentials.as_ref()
            }
        }
    }
}

/// Messages a connector pushes back over the connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Return {
        #[serde(default)]
        payload: Value,
    },
    StartWorkflow {
        #[serde(default)]
        payload: Value,
    },
    Fail {
        #[serde(default)]
        payload: Value,
    },
    Log {
        #[serde(default)]
        payload: Value,
    },
}
