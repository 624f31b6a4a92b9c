//! Workflow runtime for switchboard.
//!
//! A [`Runtime`] resolves addresses against the connector table, runs
//! in-process workflows, opens a connection per action or listener and turns
//! what happens on it into log records and caller continuations. Each call
//! hands back a [`CallHandle`] for attaching a failure continuation.

pub mod error;
pub mod handle;
pub mod registry;
pub mod runtime;

pub use error::{CallKind, Result, RuntimeError};
pub use handle::CallHandle;
pub use registry::WorkflowRegistry;
pub use runtime::{Continuation, Runtime, RuntimeBuilder};
