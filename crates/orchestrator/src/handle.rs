use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::runtime::{Continuation, Runtime};

/// Returned immediately by [`Runtime::run`] and [`Runtime::listen`].
///
/// A fail continuation may be attached at any time. A failure that happens
/// before one is attached (an unknown connector is detected while dispatching)
/// is held back and delivered on attach. Either way it is delivered at most
/// once per handle.
#[derive(Clone)]
pub struct CallHandle {
    reference: Arc<str>,
    params: Arc<Value>,
    runtime: Runtime,
    state: Arc<Mutex<CallState>>,
}

#[derive(Default)]
struct CallState {
    resolved: bool,
    on_fail: Option<Continuation>,
    pending_failure: Option<Value>,
    failure_delivered: bool,
}

impl CallHandle {
    pub(crate) fn new(runtime: Runtime, reference: &str, params: Value) -> Self {
        Self {
            reference: Arc::from(reference),
            params: Arc::new(params),
            runtime,
            state: Arc::new(Mutex::new(CallState::default())),
        }
    }

    /// The address as given by the caller.
    pub fn address(&self) -> &str {
        &self.reference
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Attach the continuation run when the call fails.
    pub fn on_fail<F>(self, continuation: F) -> Self
    where
        F: Fn(&Runtime, Value) + Send + Sync + 'static,
    {
        let continuation: Continuation = Arc::new(continuation);

        let pending = {
            let mut state = self.lock();
            if state.failure_delivered {
                None
            } else if let Some(payload) = state.pending_failure.take() {
                state.failure_delivered = true;
                Some(payload)
            } else {
                state.on_fail = Some(continuation.clone());
                None
            }
        };

        if let Some(payload) = pending {
            continuation(&self.runtime, payload);
        }
        self
    }

    /// Whether the call reached a terminal outcome.
    pub fn is_resolved(&self) -> bool {
        self.lock().resolved
    }

    pub fn has_failed(&self) -> bool {
        let state = self.lock();
        state.failure_delivered || state.pending_failure.is_some()
    }

    /// Claim the single terminal outcome. Only the first caller gets true.
    pub(crate) fn resolve(&self) -> bool {
        let mut state = self.lock();
        if state.resolved {
            false
        } else {
            state.resolved = true;
            true
        }
    }

    /// Hand `payload` to the fail continuation, now or once one is attached.
    pub(crate) fn fail(&self, payload: Value) {
        let continuation = {
            let mut state = self.lock();
            state.resolved = true;
            if state.failure_delivered || state.pending_failure.is_some() {
                return;
            }
            match state.on_fail.take() {
                Some(continuation) => {
                    state.failure_delivered = true;
                    continuation
                }
                None => {
                    state.pending_failure = Some(payload);
                    return;
                }
            }
        };

        continuation(&self.runtime, payload);
    }

    fn lock(&self) -> MutexGuard<'_, CallState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHandle")
            .field("address", &self.reference)
            .field("params", &self.params)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchboard_core::{ConnectorTable, CredentialStore};
    use tokio::runtime::Handle;

    fn runtime() -> Runtime {
        Runtime::builder(Handle::current(), ConnectorTable::new(), CredentialStore::empty()).build()
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Runtime, Value) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        (count, move |_: &Runtime, _: Value| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_accessors() {
        let call = CallHandle::new(runtime(), "mail.send", json!({"to": "a@example.com"}));
        assert_eq!(call.address(), "mail.send");
        assert_eq!(call.params(), &json!({"to": "a@example.com"}));
        assert!(!call.is_resolved());
        assert!(!call.has_failed());
    }

    #[tokio::test]
    async fn test_failure_after_attach() {
        let call = CallHandle::new(runtime(), "mail.send", json!({}));
        let (count, continuation) = counter();
        let call = call.on_fail(continuation);

        call.fail(json!({"reason": "quota"}));
        call.fail(json!({"reason": "again"}));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(call.is_resolved());
        assert!(call.has_failed());
    }

    #[tokio::test]
    async fn test_failure_before_attach_is_parked() {
        let call = CallHandle::new(runtime(), "mail.send", json!({}));
        call.fail(json!({}));

        let (count, continuation) = counter();
        let call = call.on_fail(continuation);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let (second, continuation) = counter();
        call.on_fail(continuation);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_payload_is_passed_through() {
        let (tx, rx) = std::sync::mpsc::channel();
        let call = CallHandle::new(runtime(), "mail.send", json!({}))
            .on_fail(move |_, payload| tx.send(payload).unwrap());

        call.fail(json!({"reason": "quota"}));
        assert_eq!(rx.recv().unwrap(), json!({"reason": "quota"}));
    }

    #[tokio::test]
    async fn test_resolve_only_once() {
        let call = CallHandle::new(runtime(), "mail.send", json!({}));
        assert!(call.resolve());
        assert!(!call.resolve());
        assert!(call.is_resolved());
    }

    #[tokio::test]
    async fn test_without_continuation_failure_is_swallowed() {
        let call = CallHandle::new(runtime(), "mail.send", json!({}));
        call.fail(json!({}));
        assert!(call.has_failed());
    }
}
