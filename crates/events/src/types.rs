//! Log record types for the switchboard log stream

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Envelope wrapping every published record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEnvelope {
    /// Unique record ID
    pub id: Uuid,
    /// When the record was produced
    pub timestamp: DateTime<Utc>,
    /// The actual record
    pub record: LogRecord,
}

impl LogEnvelope {
    /// Create a new envelope with auto-generated ID and timestamp
    pub fn new(record: LogRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            record,
        }
    }
}

/// Severity carried by `log` records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Success,
    Info,
    Warn,
    Error,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four record shapes observed by log consumers.
///
/// Serialized with a `type` discriminator:
/// `{"type":"log","status":"info","message":"..."}`,
/// `{"type":"response","data":{...}}`, `{"type":"trigger","data":{...}}`,
/// `{"type":"fail","message":"..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogRecord {
    Log { status: LogStatus, message: String },
    Response { data: Value },
    Trigger { data: Value },
    Fail { message: String },
}

impl LogRecord {
    pub fn log(status: LogStatus, message: impl Into<String>) -> Self {
        Self::Log {
            status,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::log(LogStatus::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::log(LogStatus::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::log(LogStatus::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::log(LogStatus::Error, message)
    }

    /// Build a record from a connector-originated log payload.
    ///
    /// Payloads that already are a complete record (`{"type":"fail",...}`,
    /// `{"type":"response",...}`) keep their shape. Anything else is read as
    /// a `{status, message}` mapping: unknown or missing statuses are
    /// reported as `info` and a missing message falls back to the JSON text
    /// of the whole payload.
    pub fn from_log_info(info: &Value) -> Self {
        if let Ok(record) = serde_json::from_value::<LogRecord>(info.clone()) {
            return record;
        }

        let status = info
            .get("status")
            .and_then(Value::as_str)
            .and_then(LogStatus::parse)
            .unwrap_or(LogStatus::Info);
        let message = match info.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => info.to_string(),
        };
        Self::Log { status, message }
    }

    /// The `type` discriminator value
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Log { .. } => "log",
            Self::Response { .. } => "response",
            Self::Trigger { .. } => "trigger",
            Self::Fail { .. } => "fail",
        }
    }

    pub fn status(&self) -> Option<LogStatus> {
        match self {
            Self::Log { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Log { message, .. } | Self::Fail { message } => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Response { data } | Self::Trigger { data } => Some(data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_creation() {
        let envelope = LogEnvelope::new(LogRecord::info("hello"));

        assert!(!envelope.id.is_nil());
        assert!(envelope.timestamp <= Utc::now());
    }

    #[test]
    fn test_record_serialization() {
        let json = serde_json::to_value(LogRecord::warn("Listener 'a.b' reconnecting")).unwrap();
        assert_eq!(
            json,
            json!({"type": "log", "status": "warn", "message": "Listener 'a.b' reconnecting"})
        );

        let json = serde_json::to_value(LogRecord::Response {
            data: json!({"sent": true}),
        })
        .unwrap();
        assert_eq!(json, json!({"type": "response", "data": {"sent": true}}));

        let json = serde_json::to_value(LogRecord::Fail {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json, json!({"type": "fail", "message": "boom"}));
    }

    #[test]
    fn test_record_deserialization() {
        let json = r#"{"type":"trigger","data":{"ref":"main"}}"#;
        let record: LogRecord = serde_json::from_str(json).unwrap();

        match record {
            LogRecord::Trigger { data } => assert_eq!(data, json!({"ref": "main"})),
            _ => panic!("Wrong record type"),
        }

        let bad = r#"{"type":"log","status":"loud","message":"x"}"#;
        assert!(serde_json::from_str::<LogRecord>(bad).is_err());
    }

    #[test]
    fn test_from_log_info() {
        let record = LogRecord::from_log_info(&json!({"status": "warn", "message": "slow"}));
        assert_eq!(record, LogRecord::warn("slow"));

        let record = LogRecord::from_log_info(&json!({"message": "no status"}));
        assert_eq!(record.status(), Some(LogStatus::Info));

        let record = LogRecord::from_log_info(&json!({"status": "error"}));
        assert_eq!(record.status(), Some(LogStatus::Error));
        assert_eq!(record.message(), Some(r#"{"status":"error"}"#));
    }

    #[test]
    fn test_from_log_info_keeps_complete_records() {
        let record = LogRecord::from_log_info(&json!({"type": "fail", "message": "quota exceeded"}));
        assert_eq!(
            record,
            LogRecord::Fail {
                message: "quota exceeded".to_string()
            }
        );

        let record = LogRecord::from_log_info(&json!({"type": "response", "data": {"sent": true}}));
        assert_eq!(record.data(), Some(&json!({"sent": true})));

        let record = LogRecord::from_log_info(&json!({"type": "trigger", "data": [1, 2]}));
        assert_eq!(record.kind(), "trigger");
    }

    #[test]
    fn test_from_log_info_falls_back_for_unknown_status() {
        let info = json!({"type": "log", "status": "debug", "message": "verbose"});
        assert_eq!(LogRecord::from_log_info(&info), LogRecord::info("verbose"));
    }

    #[test]
    fn test_accessors() {
        let record = LogRecord::success("done");
        assert_eq!(record.kind(), "log");
        assert_eq!(record.status(), Some(LogStatus::Success));
        assert_eq!(record.message(), Some("done"));
        assert_eq!(record.data(), None);

        let record = LogRecord::Trigger { data: json!({}) };
        assert_eq!(record.kind(), "trigger");
        assert_eq!(record.status(), None);
        assert_eq!(record.data(), Some(&json!({})));
    }
}
