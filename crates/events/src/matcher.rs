//! Matching records on the log stream

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::types::{LogEnvelope, LogRecord, LogStatus};

/// Describes the record a consumer expects to see.
///
/// `None` fields match anything, so `RecordMatcher::Response(None)` accepts
/// any response while `RecordMatcher::Response(Some(data))` requires equal data.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordMatcher {
    Log {
        status: Option<LogStatus>,
        message: Option<String>,
    },
    Response(Option<Value>),
    Trigger(Option<Value>),
    Fail(Option<String>),
}

impl RecordMatcher {
    /// Any `log` record
    pub fn any_log() -> Self {
        Self::Log {
            status: None,
            message: None,
        }
    }

    pub fn log_status(status: LogStatus) -> Self {
        Self::Log {
            status: Some(status),
            message: None,
        }
    }

    pub fn log_message(message: impl Into<String>) -> Self {
        Self::Log {
            status: None,
            message: Some(message.into()),
        }
    }

    pub fn log(status: LogStatus, message: impl Into<String>) -> Self {
        Self::Log {
            status: Some(status),
            message: Some(message.into()),
        }
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        match (self, record) {
            (
                Self::Log { status, message },
                LogRecord::Log {
                    status: actual_status,
                    message: actual_message,
                },
            ) => {
                status.map_or(true, |s| s == *actual_status)
                    && message.as_ref().map_or(true, |m| m == actual_message)
            }
            (Self::Response(expected), LogRecord::Response { data })
            | (Self::Trigger(expected), LogRecord::Trigger { data }) => {
                expected.as_ref().map_or(true, |e| e == data)
            }
            (Self::Fail(expected), LogRecord::Fail { message }) => {
                expected.as_ref().map_or(true, |e| e == message)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("No matching record within {0:?}")]
    Timeout(Duration),

    #[error("Event bus closed before a matching record arrived")]
    Closed,
}

/// Consume records from `receiver` until one satisfies `matcher`.
pub async fn wait_for(
    receiver: &mut broadcast::Receiver<LogEnvelope>,
    matcher: &RecordMatcher,
    timeout: Duration,
) -> Result<LogRecord, WaitError> {
    let search = async {
        loop {
            match receiver.recv().await {
                Ok(envelope) if matcher.matches(&envelope.record) => return Ok(envelope.record),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Log receiver lagged, missed {} records", n);
                }
                Err(broadcast::error::RecvError::Closed) => return Err(WaitError::Closed),
            }
        }
    };

    tokio::time::timeout(timeout, search)
        .await
        .unwrap_or(Err(WaitError::Timeout(timeout)))
}
