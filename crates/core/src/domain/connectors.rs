use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

/// Maps dotted connector namespaces to the URL the connector listens on.
///
/// Built once from a nested configuration document and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectorTable {
    urls: BTreeMap<String, String>,
}

impl ConnectorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a nested mapping into dotted keys.
    ///
    /// `{"web": {"hook": "ws://..."}}` becomes `web.hook -> ws://...`.
    /// Leaves that are not strings are skipped.
    pub fn from_nested(value: &Value) -> Self {
        let mut urls = BTreeMap::new();
        flatten_into(&mut urls, None, value);
        Self { urls }
    }

    pub fn resolve(&self, namespace: &str) -> Option<&str> {
        self.urls.get(namespace).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.urls.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for ConnectorTable
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            urls: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn flatten_into(urls: &mut BTreeMap<String, String>, prefix: Option<&str>, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = match prefix {
                    Some(prefix) => format!("{}.{}", prefix, key),
                    None => key.clone(),
                };
                flatten_into(urls, Some(&path), child);
            }
        }
        Value::String(url) => {
            if let Some(path) = prefix {
                urls.insert(path.to_string(), url.clone());
            }
        }
        other => {
            warn!(path = ?prefix, value = %other, "Ignoring non-string connector entry");
        }
    }
}
