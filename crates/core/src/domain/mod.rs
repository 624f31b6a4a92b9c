pub mod address;
pub mod connectors;
pub mod credentials;
