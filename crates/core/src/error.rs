use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Address is empty")]
    Empty,

    #[error("Address '{0}' is missing the '.' separator")]
    MissingSeparator(String),

    #[error("Address '{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("Address '{raw}' contains invalid character {ch:?}")]
    InvalidCharacter { raw: String, ch: char },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config file {path} could not be converted: {source}")]
    Convert {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
