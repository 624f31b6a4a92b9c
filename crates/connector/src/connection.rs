use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::events::{ConnectionEvent, EventKind};
use crate::messages::ClientMessage;
use crate::policy::ReconnectPolicy;
use crate::transport::{Channel, Transport};

pub type EventHandler = Box<dyn FnMut(&ConnectionEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Retrying,
    Closed,
}

/// A single call or subscription against one connector endpoint.
///
/// Handlers are registered with [`on`](Self::on) before the connection is
/// started: [`action`](Self::action) and [`listen`](Self::listen) consume the
/// connection and spawn its driver on the executor given at construction, so
/// `open` may fire as soon as they return. The returned [`ConnectionHandle`]
/// is the only way to stop it.
pub struct Connection {
    url: String,
    transport: Arc<dyn Transport>,
    executor: Handle,
    policy: ReconnectPolicy,
    credentials: Option<Value>,
    handlers: HashMap<EventKind, Vec<EventHandler>>,
    handle: ConnectionHandle,
}

impl Connection {
    pub fn new(url: impl Into<String>, transport: Arc<dyn Transport>, executor: Handle) -> Self {
        let url = url.into();
        Self {
            handle: ConnectionHandle::new(url.clone()),
            url,
            transport,
            executor,
            policy: ReconnectPolicy::default(),
            credentials: None,
            handlers: HashMap::new(),
        }
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attach credentials to every request sent over this connection.
    pub fn with_credentials(mut self, credentials: Value) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> &mut Self
    where
        F: FnMut(&ConnectionEvent) + Send + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Handle usable from inside handlers, e.g. to close after a result.
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    pub fn close(&self) {
        self.handle.close();
    }

    /// Start a one-shot remote call.
    pub fn action(self, local_id: impl Into<String>, params: Value) -> ConnectionHandle {
        let request = ClientMessage::Action {
            id: local_id.into(),
            params,
            credentials: self.credentials.clone(),
        };
        self.start(request)
    }

    /// Start a subscription that stays open until closed.
    pub fn listen(self, local_id: impl Into<String>, params: Value) -> ConnectionHandle {
        let request = ClientMessage::Listen {
            id: local_id.into(),
            params,
            credentials: self.credentials.clone(),
        };
        self.start(request)
    }

    fn start(self, request: ClientMessage) -> ConnectionHandle {
        let handle = self.handle.clone();
        let driver = Driver {
            url: self.url,
            transport: self.transport,
            policy: self.policy,
            handlers: self.handlers,
            handle: self.handle,
            failures: 0,
            delivered: false,
        };
        self.executor.spawn(driver.run(request));
        handle
    }
}

/// Cloneable control over a started connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    url: String,
    state: watch::Sender<ConnectionState>,
    closed: watch::Sender<bool>,
}

impl ConnectionHandle {
    fn new(url: String) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(HandleInner { url, state, closed }),
        }
    }

    /// Tear the connection down and disable reconnects.
    pub fn close(&self) {
        self.inner.closed.send_replace(true);
    }

    pub fn is_close_requested(&self) -> bool {
        *self.inner.closed.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Resolve once the driver has stopped for good.
    pub async fn wait_closed(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == ConnectionState::Closed).await;
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.state.send_replace(state);
    }

    fn close_signal(&self) -> watch::Receiver<bool> {
        self.inner.closed.subscribe()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .field("close_requested", &self.is_close_requested())
            .finish()
    }
}

async fn close_requested(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|closed| *closed).await;
}

enum SessionEnd {
    Closed,
    Dropped,
}

struct Driver {
    url: String,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    handlers: HashMap<EventKind, Vec<EventHandler>>,
    handle: ConnectionHandle,
    /// Drops and refused connects since the connector last sent anything.
    failures: u32,
    /// Whether the request has been handed to a channel at least once.
    delivered: bool,
}

impl Driver {
    async fn run(mut self, request: ClientMessage) {
        let mut close_signal = self.handle.close_signal();

        loop {
            if self.handle.is_close_requested() {
                break;
            }

            self.handle.set_state(ConnectionState::Connecting);
            debug!(url = %self.url, id = %request.local_id(), "Connecting to connector");

            let connected = tokio::select! {
                biased;
                _ = close_requested(&mut close_signal) => break,
                result = self.transport.connect(&self.url) => result,
            };

            match connected {
                Ok(mut channel) => {
                    self.handle.set_state(ConnectionState::Open);
                    self.dispatch(ConnectionEvent::Open);

                    match self.serve(channel.as_mut(), &request, &mut close_signal).await {
                        SessionEnd::Closed => {
                            self.dispatch(ConnectionEvent::Close { expected: true });
                            break;
                        }
                        SessionEnd::Dropped => {
                            self.dispatch(ConnectionEvent::Close { expected: false });
                        }
                    }
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Failed to connect to connector");
                    self.dispatch(ConnectionEvent::Error {
                        message: e.to_string(),
                        protocol: false,
                    });
                }
            }

            if self.handle.is_close_requested() {
                break;
            }

            // a delivered action is never sent twice
            if self.delivered && request.is_action() {
                warn!(url = %self.url, id = %request.local_id(), "Connection lost before the action completed");
                self.dispatch(ConnectionEvent::Fail(json!({
                    "message": "connection lost before the action completed",
                })));
                break;
            }

            self.failures += 1;
            if !self.policy.allows(self.failures) {
                warn!(
                    url = %self.url,
                    attempts = self.policy.max_attempts,
                    "Giving up on connector after all reconnect attempts"
                );
                self.dispatch(ConnectionEvent::Fail(json!({
                    "message": "reconnect attempts exhausted",
                    "attempts": self.policy.max_attempts,
                })));
                break;
            }

            let delay = self.policy.delay_for(self.failures);
            self.handle.set_state(ConnectionState::Retrying);
            self.dispatch(ConnectionEvent::Retry {
                attempt: self.failures,
                delay,
            });

            tokio::select! {
                biased;
                _ = close_requested(&mut close_signal) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.handle.set_state(ConnectionState::Closed);
        debug!(url = %self.url, "Connection closed");
    }

    async fn serve(
        &mut self,
        channel: &mut dyn Channel,
        request: &ClientMessage,
        close_signal: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        if let Err(e) = channel.send(request).await {
            warn!(url = %self.url, error = %e, "Failed to send request");
            self.dispatch(ConnectionEvent::Error {
                message: e.to_string(),
                protocol: false,
            });
            return SessionEnd::Dropped;
        }
        self.delivered = true;

        loop {
            tokio::select! {
                biased;
                _ = close_requested(close_signal) => {
                    if let Err(e) = channel.close().await {
                        debug!(url = %self.url, error = %e, "Error while closing channel");
                    }
                    return SessionEnd::Closed;
                }
                message = channel.recv() => match message {
                    Some(Ok(message)) => {
                        self.failures = 0;
                        self.dispatch(ConnectionEvent::from(message));
                    }
                    Some(Err(e)) if !e.is_fatal() => {
                        warn!(url = %self.url, error = %e, "Ignoring invalid message");
                        self.dispatch(ConnectionEvent::Error {
                            message: e.to_string(),
                            protocol: true,
                        });
                    }
                    Some(Err(e)) => {
                        self.dispatch(ConnectionEvent::Error {
                            message: e.to_string(),
                            protocol: false,
                        });
                        return SessionEnd::Dropped;
                    }
                    None => return SessionEnd::Dropped,
                }
            }
        }
    }

    fn dispatch(&mut self, event: ConnectionEvent) {
        if let Some(handlers) = self.handlers.get_mut(&event.kind()) {
            for handler in handlers.iter_mut() {
                handler(&event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ServerMessage;
    use crate::transport::memory::MemoryTransport;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn recording(
        transport: &MemoryTransport,
        policy: ReconnectPolicy,
    ) -> (Connection, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut connection = Connection::new(
            "mem://mail",
            Arc::new(transport.clone()),
            Handle::current(),
        )
        .with_reconnect_policy(policy);
        for kind in EventKind::ALL {
            let tx = tx.clone();
            connection.on(kind, move |event| {
                let _ = tx.send(event.clone());
            });
        }
        (connection, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(max_attempts, Duration::from_millis(5), Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_action_sends_request_and_reports_return() {
        let transport = MemoryTransport::new();
        let (connection, mut rx) = recording(&transport, fast_policy(3));
        let connection = connection.with_credentials(json!({"api_key": "secret"}));
        assert_eq!(connection.handle().state(), ConnectionState::Idle);

        let handle = connection.action("send", json!({"to": "a@example.com"}));
        let mut session = transport.accept().await.unwrap();

        assert_eq!(next(&mut rx).await, ConnectionEvent::Open);
        assert_eq!(
            session.request().await,
            Some(ClientMessage::Action {
                id: "send".to_string(),
                params: json!({"to": "a@example.com"}),
                credentials: Some(json!({"api_key": "secret"})),
            })
        );

        session.reply(ServerMessage::Return {
            payload: json!({"sent": true}),
        });
        assert_eq!(next(&mut rx).await, ConnectionEvent::Return(json!({"sent": true})));
        assert_eq!(handle.state(), ConnectionState::Open);

        handle.close();
        assert_eq!(next(&mut rx).await, ConnectionEvent::Close { expected: true });
        handle.wait_closed().await;
        assert_eq!(handle.state(), ConnectionState::Closed);
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_close_from_handler_stops_connection() {
        let transport = MemoryTransport::new();
        let mut connection = Connection::new(
            "mem://mail",
            Arc::new(transport.clone()),
            Handle::current(),
        );
        let closer = connection.handle();
        connection.on(EventKind::Return, move |_| closer.close());

        let handle = connection.action("send", json!({}));
        let mut session = transport.accept().await.unwrap();
        session.request().await.unwrap();
        session.reply(ServerMessage::Return { payload: json!({}) });

        timeout(Duration::from_secs(5), session.closed()).await.unwrap();
        timeout(Duration::from_secs(5), handle.wait_closed()).await.unwrap();
    }

    #[tokio::test]
    async fn test_listen_reconnects_and_resubscribes() {
        let transport = MemoryTransport::new();
        let (connection, mut rx) = recording(&transport, fast_policy(3));
        let handle = connection.listen("push", json!({"repo": "x"}));

        let mut session = transport.accept().await.unwrap();
        assert_eq!(next(&mut rx).await, ConnectionEvent::Open);
        assert!(matches!(
            session.request().await,
            Some(ClientMessage::Listen { .. })
        ));

        session.reply(ServerMessage::StartWorkflow { payload: json!({"n": 1}) });
        assert_eq!(next(&mut rx).await, ConnectionEvent::StartWorkflow(json!({"n": 1})));

        session.disconnect();
        assert_eq!(next(&mut rx).await, ConnectionEvent::Close { expected: false });
        assert!(matches!(
            next(&mut rx).await,
            ConnectionEvent::Retry { attempt: 1, .. }
        ));

        let mut session = transport.accept().await.unwrap();
        assert_eq!(next(&mut rx).await, ConnectionEvent::Open);
        assert!(matches!(
            session.request().await,
            Some(ClientMessage::Listen { .. })
        ));

        session.reply(ServerMessage::StartWorkflow { payload: json!({"n": 2}) });
        assert_eq!(next(&mut rx).await, ConnectionEvent::StartWorkflow(json!({"n": 2})));

        handle.close();
        assert_eq!(next(&mut rx).await, ConnectionEvent::Close { expected: true });
        handle.wait_closed().await;
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_frame_is_not_fatal() {
        let transport = MemoryTransport::new();
        let (connection, mut rx) = recording(&transport, fast_policy(3));
        let handle = connection.action("send", json!({}));

        let mut session = transport.accept().await.unwrap();
        session.request().await.unwrap();
        assert_eq!(next(&mut rx).await, ConnectionEvent::Open);

        session.reply_garbage("not json");
        assert!(matches!(
            next(&mut rx).await,
            ConnectionEvent::Error { protocol: true, .. }
        ));

        session.reply(ServerMessage::Log {
            payload: json!({"status": "info", "message": "working"}),
        });
        assert_eq!(
            next(&mut rx).await,
            ConnectionEvent::Log(json!({"status": "info", "message": "working"}))
        );
        assert_eq!(handle.state(), ConnectionState::Open);
        handle.close();
    }

    #[tokio::test]
    async fn test_exhausted_reconnects_escalate_to_fail() {
        let transport = MemoryTransport::new();
        transport.set_refusing(true);
        let (connection, mut rx) = recording(&transport, fast_policy(2));
        let handle = connection.action("send", json!({}));

        assert!(matches!(next(&mut rx).await, ConnectionEvent::Error { .. }));
        assert!(matches!(next(&mut rx).await, ConnectionEvent::Retry { attempt: 1, .. }));
        assert!(matches!(next(&mut rx).await, ConnectionEvent::Error { .. }));
        assert!(matches!(next(&mut rx).await, ConnectionEvent::Retry { attempt: 2, .. }));
        assert!(matches!(next(&mut rx).await, ConnectionEvent::Error { .. }));
        assert_eq!(
            next(&mut rx).await,
            ConnectionEvent::Fail(json!({"message": "reconnect attempts exhausted", "attempts": 2}))
        );

        timeout(Duration::from_secs(5), handle.wait_closed()).await.unwrap();
        assert_eq!(transport.connect_count(), 3);
    }

    #[tokio::test]
    async fn test_close_during_backoff_prevents_reconnect() {
        let transport = MemoryTransport::new();
        transport.set_refusing(true);
        let (connection, mut rx) = recording(
            &transport,
            ReconnectPolicy::new(5, Duration::from_secs(60), Duration::from_secs(60)),
        );
        let handle = connection.listen("push", json!({}));

        assert!(matches!(next(&mut rx).await, ConnectionEvent::Error { .. }));
        assert!(matches!(next(&mut rx).await, ConnectionEvent::Retry { .. }));
        assert_eq!(handle.state(), ConnectionState::Retrying);

        handle.close();
        timeout(Duration::from_secs(5), handle.wait_closed()).await.unwrap();
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_before_start_never_connects() {
        let transport = MemoryTransport::new();
        let (connection, _rx) = recording(&transport, fast_policy(3));
        connection.close();
        let handle = connection.action("send", json!({}));

        timeout(Duration::from_secs(5), handle.wait_closed()).await.unwrap();
        assert_eq!(transport.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_action_fails_without_resending() {
        let transport = MemoryTransport::new();
        let (connection, mut rx) = recording(&transport, fast_policy(3));
        let handle = connection.action("send", json!({}));

        let mut session = transport.accept().await.unwrap();
        assert!(session.request().await.unwrap().is_action());
        session.disconnect();

        assert_eq!(next(&mut rx).await, ConnectionEvent::Open);
        assert_eq!(next(&mut rx).await, ConnectionEvent::Close { expected: false });
        assert_eq!(
            next(&mut rx).await,
            ConnectionEvent::Fail(json!({"message": "connection lost before the action completed"}))
        );

        timeout(Duration::from_secs(5), handle.wait_closed()).await.unwrap();
        assert!(timeout(Duration::from_millis(50), transport.accept()).await.is_err());
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_silent_drops_count_against_policy() {
        let transport = MemoryTransport::new();
        let (connection, mut rx) = recording(&transport, fast_policy(2));
        let handle = connection.listen("push", json!({}));

        for _ in 0..3 {
            let mut session = transport.accept().await.unwrap();
            session.request().await.unwrap();
            session.disconnect();
        }

        let mut retries = 0;
        let fail = loop {
            match next(&mut rx).await {
                ConnectionEvent::Retry { .. } => retries += 1,
                ConnectionEvent::Fail(payload) => break payload,
                _ => {}
            }
        };
        assert_eq!(retries, 2);
        assert_eq!(
            fail,
            json!({"message": "reconnect attempts exhausted", "attempts": 2})
        );

        timeout(Duration::from_secs(5), handle.wait_closed()).await.unwrap();
        assert_eq!(transport.connect_count(), 3);
    }

    #[tokio::test]
    async fn test_connector_message_resets_attempts() {
        let transport = MemoryTransport::new();
        let (connection, mut rx) = recording(&transport, fast_policy(1));
        let handle = connection.listen("push", json!({}));

        let mut session = transport.accept().await.unwrap();
        session.request().await.unwrap();
        session.disconnect();

        let mut session = transport.accept().await.unwrap();
        session.request().await.unwrap();
        session.reply(ServerMessage::StartWorkflow { payload: json!({}) });
        loop {
            if let ConnectionEvent::StartWorkflow(_) = next(&mut rx).await {
                break;
            }
        }
        session.disconnect();

        assert_eq!(next(&mut rx).await, ConnectionEvent::Close { expected: false });
        assert!(matches!(
            next(&mut rx).await,
            ConnectionEvent::Retry { attempt: 1, .. }
        ));
        let _session = transport.accept().await.unwrap();

        handle.close();
        timeout(Duration::from_secs(5), handle.wait_closed()).await.unwrap();
    }
}
