//! Core types shared by the switchboard crates.
//!
//! Addresses, the connector address table, the credential store and the
//! conversion of caller-supplied values into plain JSON mappings.

pub mod config;
pub mod domain;
pub mod error;
pub mod plain;

pub use domain::address::{Address, WORKFLOW_NAMESPACE};
pub use domain::connectors::ConnectorTable;
pub use domain::credentials::CredentialStore;
pub use error::{AddressError, ConfigError};
