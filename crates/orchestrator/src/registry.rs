use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use switchboard_core::Address;

use crate::runtime::Continuation;

/// In-process workflows, keyed by their workflow address.
///
/// Entries are only ever added; registering a key again replaces the handler.
#[derive(Default)]
pub struct WorkflowRegistry {
    handlers: RwLock<HashMap<Address, Continuation>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handler` under the workflow key of `address`.
    ///
    /// Returns true if an earlier handler was replaced.
    pub fn register(&self, address: &Address, handler: Continuation) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.workflow_key(), handler)
            .is_some()
    }

    pub fn get(&self, address: &Address) -> Option<Continuation> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&address.workflow_key())
            .cloned()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("len", &self.len())
            .finish()
    }
}
