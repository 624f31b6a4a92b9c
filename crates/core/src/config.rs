//! Loading of the nested TOML documents that hold connector URLs and
//! credentials.

use std::path::Path;

use serde_json::Value;
use tokio::fs;
use tracing::debug;

use crate::domain::connectors::ConnectorTable;
use crate::domain::credentials::CredentialStore;
use crate::error::ConfigError;

/// Read a TOML file into a nested JSON value.
pub async fn load_nested(path: &Path) -> Result<Value, ConfigError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let value = parse_nested(&content).map_err(|e| match e {
        NestedError::Toml(source) => ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        NestedError::Json(source) => ConfigError::Convert {
            path: path.to_path_buf(),
            source,
        },
    })?;

    debug!(path = %path.display(), "Config loaded successfully");
    Ok(value)
}

pub async fn load_connectors(path: &Path) -> Result<ConnectorTable, ConfigError> {
    let nested = load_nested(path).await?;
    Ok(ConnectorTable::from_nested(&nested))
}

/// Load credentials, treating a missing file as an empty store.
pub async fn load_credentials(path: &Path) -> Result<CredentialStore, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "Credentials file does not exist, using empty store");
        return Ok(CredentialStore::empty());
    }

    let nested = load_nested(path).await?;
    Ok(CredentialStore::from_nested(nested))
}

enum NestedError {
    Toml(toml::de::Error),
    Json(serde_json::Error),
}

fn parse_nested(content: &str) -> Result<Value, NestedError> {
    let table: toml::Table = toml::from_str(content).map_err(NestedError::Toml)?;
    serde_json::to_value(table).map_err(NestedError::Json)
}
