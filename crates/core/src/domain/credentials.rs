use serde_json::{Map, Value};

/// Nested credential settings, keyed the same way as the connector table.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialStore {
    root: Value,
}

impl CredentialStore {
    pub fn empty() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn from_nested(value: Value) -> Self {
        match value {
            Value::Object(_) => Self { root: value },
            _ => Self::empty(),
        }
    }

    /// Credentials stored under a dotted connector namespace, if any.
    pub fn for_namespace(&self, namespace: &str) -> Option<&Value> {
        namespace
            .split('.')
            .try_fold(&self.root, |node, segment| node.get(segment))
    }

    pub fn is_empty(&self) -> bool {
        self.root.as_object().map_or(true, Map::is_empty)
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::empty()
    }
}
