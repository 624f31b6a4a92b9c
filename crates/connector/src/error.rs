use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid message from connector: {0}")]
    Protocol(String),

    #[error("Connection closed")]
    Closed,
}

impl ConnectorError {
    /// Whether the channel that produced this error is unusable.
    ///
    /// Protocol errors concern a single frame; the channel stays open.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Protocol(_))
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fatal() {
        assert!(!ConnectorError::Protocol("bad frame".to_string()).is_fatal());
        assert!(ConnectorError::Closed.is_fatal());
        assert!(ConnectorError::Connection("refused".to_string()).is_fatal());
    }
}
