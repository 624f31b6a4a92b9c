//! Log stream for switchboard
//!
//! This crate provides the structured log record types, the broadcast bus
//! they are published on, and matchers for inspecting the stream.

mod bus;
mod matcher;
mod types;

pub use bus::EventBus;
pub use matcher::{wait_for, RecordMatcher, WaitError};
pub use types::*;
