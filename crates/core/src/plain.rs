//! Conversion of caller values into plain JSON mappings.
//!
//! Parameters handed to `run`/`listen` may be typed structs or `json!` values;
//! continuations and workflow handlers always receive plain `serde_json`
//! values, with a missing payload represented as an empty mapping.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// The empty mapping passed when no payload exists.
pub fn empty() -> Value {
    Value::Object(Map::new())
}

/// Serialize `value` into a plain JSON value.
///
/// `null` and values that fail to serialize become an empty mapping.
pub fn to_plain<T: Serialize + ?Sized>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(Value::Null) => empty(),
        Ok(plain) => plain,
        Err(e) => {
            warn!(error = %e, "Failed to convert value, using empty mapping");
            empty()
        }
    }
}
