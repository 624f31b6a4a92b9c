use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use connector::{
    Connection, ConnectionEvent, ConnectionHandle, ConnectionState, EventKind, ReconnectPolicy,
    Transport, WebSocketTransport,
};
use events::{EventBus, LogRecord, LogStatus};
use serde::Serialize;
use serde_json::Value;
use switchboard_core::{plain, Address, ConnectorTable, CredentialStore};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{CallKind, Result, RuntimeError};
use crate::handle::CallHandle;
use crate::registry::WorkflowRegistry;

/// Callback receiving the runtime and a plain payload.
///
/// Used for action results, listener triggers, fail continuations and
/// workflow handlers alike, so each of them can dispatch further calls.
pub type Continuation = Arc<dyn Fn(&Runtime, Value) + Send + Sync>;

/// Dispatches calls to connectors and in-process workflows and reports every
/// step on the log stream.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    instance_id: String,
    executor: Handle,
    connectors: ConnectorTable,
    credentials: CredentialStore,
    workflows: WorkflowRegistry,
    transport: Arc<dyn Transport>,
    reconnect_policy: ReconnectPolicy,
    event_bus: EventBus,
    connections: Mutex<Vec<ConnectionHandle>>,
}

pub struct RuntimeBuilder {
    executor: Handle,
    connectors: ConnectorTable,
    credentials: CredentialStore,
    transport: Arc<dyn Transport>,
    reconnect_policy: ReconnectPolicy,
    event_bus: EventBus,
}

impl RuntimeBuilder {
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = bus;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    pub fn build(self) -> Runtime {
        let instance_id = Uuid::new_v4().simple().to_string()[..6].to_string();
        debug!(
            instance = %instance_id,
            connectors = self.connectors.len(),
            "Runtime created"
        );

        Runtime {
            inner: Arc::new(RuntimeInner {
                instance_id,
                executor: self.executor,
                connectors: self.connectors,
                credentials: self.credentials,
                workflows: WorkflowRegistry::new(),
                transport: self.transport,
                reconnect_policy: self.reconnect_policy,
                event_bus: self.event_bus,
                connections: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl Runtime {
    /// Start building a runtime whose connections run on `executor`.
    pub fn builder(
        executor: Handle,
        connectors: ConnectorTable,
        credentials: CredentialStore,
    ) -> RuntimeBuilder {
        RuntimeBuilder {
            executor,
            connectors,
            credentials,
            transport: Arc::new(WebSocketTransport::new()),
            reconnect_policy: ReconnectPolicy::default(),
            event_bus: EventBus::new(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    pub fn connectors(&self) -> &ConnectorTable {
        &self.inner.connectors
    }

    /// Run a workflow definition, then wait for `shutdown` before closing
    /// every connection the definition opened.
    ///
    /// Runs on the caller's Tokio runtime. An error returned by `definition`
    /// closes what was opened so far and is handed back unchanged.
    pub async fn load<F, E, S>(&self, definition: F, shutdown: S) -> std::result::Result<(), E>
    where
        F: FnOnce(&Runtime) -> std::result::Result<(), E>,
        S: Future<Output = ()>,
    {
        info!(instance = %self.instance_id(), "Loading workflow definition");

        if let Err(e) = definition(self) {
            self.shutdown();
            return Err(e);
        }

        shutdown.await;
        info!(instance = %self.instance_id(), "Shutdown signal received");
        self.shutdown();
        Ok(())
    }

    /// Register an in-process workflow reachable through `run`.
    pub fn workflow<F>(&self, reference: &str, handler: F) -> Result<Address>
    where
        F: Fn(&Runtime, Value) + Send + Sync + 'static,
    {
        let address = Address::parse(reference)
            .map_err(|e| RuntimeError::address_format(reference, e))?;
        let key = address.workflow_key();

        if self.inner.workflows.register(&key, Arc::new(handler)) {
            warn!(instance = %self.instance_id(), workflow = %key, "Workflow registered twice, replacing handler");
        } else {
            debug!(instance = %self.instance_id(), workflow = %key, "Workflow registered");
        }
        Ok(key)
    }

    /// Call an action, or run a registered workflow for `workflow.*` addresses.
    ///
    /// `on_result` receives the action's response; workflows report through
    /// the log stream only.
    pub fn run<P, F>(&self, reference: &str, params: &P, on_result: F) -> CallHandle
    where
        P: Serialize + ?Sized,
        F: Fn(&Runtime, Value) + Send + Sync + 'static,
    {
        let params = plain::to_plain(params);
        let call = CallHandle::new(self.clone(), reference, params.clone());

        match Address::parse(reference) {
            Ok(address) if address.is_workflow() => self.run_workflow(&address, params, &call),
            Ok(address) => self.run_action(address, params, Arc::new(on_result), &call),
            Err(e) => self.report(&call, RuntimeError::address_format(reference, e), plain::empty()),
        }

        call
    }

    /// Subscribe to a connector trigger. `on_trigger` fires for every event.
    pub fn listen<P, F>(&self, reference: &str, params: &P, on_trigger: F) -> CallHandle
    where
        P: Serialize + ?Sized,
        F: Fn(&Runtime, Value) + Send + Sync + 'static,
    {
        let params = plain::to_plain(params);
        let call = CallHandle::new(self.clone(), reference, params.clone());

        match Address::parse(reference) {
            Ok(address) => self.start_listener(address, params, Arc::new(on_trigger), &call),
            Err(e) => self.report(&call, RuntimeError::address_format(reference, e), plain::empty()),
        }

        call
    }

    /// Close every connection still owned by this runtime.
    pub fn shutdown(&self) {
        let connections = std::mem::take(&mut *self.lock_connections());
        info!(
            instance = %self.instance_id(),
            connections = connections.len(),
            "Closing connections"
        );
        for connection in connections {
            connection.close();
        }
    }

    /// Number of connections that have not stopped yet.
    pub fn open_connections(&self) -> usize {
        self.lock_connections()
            .iter()
            .filter(|c| c.state() != ConnectionState::Closed)
            .count()
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(LogRecord::success(message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogRecord::info(message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogRecord::warn(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogRecord::error(message));
    }

    /// Mirror `record` to tracing and publish it on the event bus.
    pub fn log(&self, record: LogRecord) {
        let instance = self.instance_id();
        match &record {
            LogRecord::Log { status, message } => match status {
                LogStatus::Success | LogStatus::Info => {
                    info!(instance = %instance, status = %status, "{}", message)
                }
                LogStatus::Warn => warn!(instance = %instance, "{}", message),
                LogStatus::Error => error!(instance = %instance, "{}", message),
            },
            LogRecord::Response { data } => info!(instance = %instance, data = %data, "Response"),
            LogRecord::Trigger { data } => info!(instance = %instance, data = %data, "Trigger"),
            LogRecord::Fail { message } => error!(instance = %instance, "{}", message),
        }
        self.inner.event_bus.publish_record(record);
    }

    fn run_workflow(&self, address: &Address, params: Value, call: &CallHandle) {
        let key = address.workflow_key();
        let Some(handler) = self.inner.workflows.get(&key) else {
            self.report(call, RuntimeError::WorkflowNotFound(key), plain::empty());
            return;
        };

        call.resolve();
        self.success(format!("Workflow '{}' starting", key));
        handler(self, params);
        self.success(format!("Workflow '{}' started", key));
    }

    fn run_action(
        &self,
        address: Address,
        params: Value,
        on_result: Continuation,
        call: &CallHandle,
    ) {
        let Some(mut connection) = self.connection_for(CallKind::Action, &address, call) else {
            return;
        };
        let closer = connection.handle();

        let runtime = self.clone();
        let label = address.clone();
        connection.on(EventKind::Open, move |_| {
            runtime.info(format!("Action '{}' starting", label));
        });

        let runtime = self.clone();
        let label = address.clone();
        connection.on(EventKind::Close, move |event| {
            if let ConnectionEvent::Close { expected: false } = event {
                runtime.error(format!("Action '{}' disconnected", label));
            }
        });

        self.wire_errors(&mut connection, CallKind::Action, &address);

        let runtime = self.clone();
        let label = address.clone();
        let result_call = call.clone();
        let result_closer = closer.clone();
        connection.on(EventKind::Return, move |event| {
            if !result_call.resolve() {
                debug!(address = %label, "Ignoring redundant return");
                return;
            }
            runtime.success(format!("Action '{}' responded", label));
            result_closer.close();
            on_result(&runtime, plain::to_plain(&event.payload()));
        });

        self.wire_failure(&mut connection, CallKind::Action, &address, call, Some(closer));
        self.wire_log_passthrough(&mut connection);

        let handle = connection.action(address.local_id(), params);
        self.track(handle);
    }

    fn start_listener(
        &self,
        address: Address,
        params: Value,
        on_trigger: Continuation,
        call: &CallHandle,
    ) {
        let Some(mut connection) = self.connection_for(CallKind::Listener, &address, call) else {
            return;
        };

        let lifecycle: [(EventKind, LogStatus, &str); 4] = [
            (EventKind::Open, LogStatus::Info, "starting"),
            (EventKind::Close, LogStatus::Error, "disconnected"),
            (EventKind::Retry, LogStatus::Warn, "reconnecting"),
            (EventKind::Return, LogStatus::Success, "started"),
        ];
        for (kind, status, verb) in lifecycle {
            let runtime = self.clone();
            let message = format!("Listener '{}' {}", address, verb);
            connection.on(kind, move |_| {
                runtime.log(LogRecord::log(status, message.clone()));
            });
        }

        self.wire_errors(&mut connection, CallKind::Listener, &address);

        let runtime = self.clone();
        let label = address.clone();
        let trigger_call = call.clone();
        connection.on(EventKind::StartWorkflow, move |event| {
            if trigger_call.is_resolved() {
                debug!(address = %label, "Ignoring trigger after failure");
                return;
            }
            runtime.success(format!("Listener '{}' triggered", label));
            on_trigger(&runtime, plain::to_plain(&event.payload()));
        });

        self.wire_failure(&mut connection, CallKind::Listener, &address, call, None);
        self.wire_log_passthrough(&mut connection);

        let handle = connection.listen(address.local_id(), params);
        self.track(handle);
    }

    /// Resolve the connector for `address` and prepare a connection to it.
    fn connection_for(
        &self,
        kind: CallKind,
        address: &Address,
        call: &CallHandle,
    ) -> Option<Connection> {
        let Some(url) = self.inner.connectors.resolve(address.namespace()) else {
            self.report(
                call,
                RuntimeError::ConnectorNotFound {
                    kind,
                    address: address.clone(),
                },
                plain::empty(),
            );
            return None;
        };

        debug!(instance = %self.instance_id(), address = %address, url = %url, "Dispatching to connector");

        let mut connection = Connection::new(
            url,
            self.inner.transport.clone(),
            self.inner.executor.clone(),
        )
        .with_reconnect_policy(self.inner.reconnect_policy);
        if let Some(credentials) = self.inner.credentials.for_namespace(address.namespace()) {
            connection = connection.with_credentials(credentials.clone());
        }
        Some(connection)
    }

    /// Log transport errors; none of them ends the call.
    fn wire_errors(&self, connection: &mut Connection, kind: CallKind, address: &Address) {
        let runtime = self.clone();
        let address = address.clone();
        connection.on(EventKind::Error, move |event| {
            let error = match event {
                ConnectionEvent::Error {
                    message,
                    protocol: true,
                } => RuntimeError::InvalidMessage {
                    kind,
                    address: address.clone(),
                    message: message.clone(),
                },
                _ => RuntimeError::ConnectionDropped {
                    kind,
                    address: address.clone(),
                },
            };
            runtime.error(error.to_string());
        });
    }

    fn wire_failure(
        &self,
        connection: &mut Connection,
        kind: CallKind,
        address: &Address,
        call: &CallHandle,
        closer: Option<ConnectionHandle>,
    ) {
        let runtime = self.clone();
        let address = address.clone();
        let call = call.clone();
        connection.on(EventKind::Fail, move |event| {
            if !call.resolve() {
                debug!(address = %address, "Ignoring failure after terminal outcome");
                return;
            }
            if let Some(closer) = &closer {
                closer.close();
            }
            let payload = plain::to_plain(&event.payload());
            runtime.report(
                &call,
                RuntimeError::RemoteFailure {
                    kind,
                    address: address.clone(),
                    payload: payload.clone(),
                },
                payload,
            );
        });
    }

    fn wire_log_passthrough(&self, connection: &mut Connection) {
        let runtime = self.clone();
        connection.on(EventKind::Log, move |event| {
            if let ConnectionEvent::Log(info) = event {
                debug!(instance = %runtime.instance_id(), payload = %info, "Connector log");
                runtime.log(LogRecord::from_log_info(info));
            }
        });
    }

    /// Log `error` and, if it ends the call, fire the fail continuation.
    fn report(&self, call: &CallHandle, error: RuntimeError, payload: Value) {
        self.error(error.to_string());
        if error.is_terminal() {
            call.fail(payload);
        }
    }

    fn track(&self, handle: ConnectionHandle) {
        let mut connections = self.lock_connections();
        connections.retain(|c| c.state() != ConnectionState::Closed);
        connections.push(handle);
    }

    fn lock_connections(&self) -> std::sync::MutexGuard<'_, Vec<ConnectionHandle>> {
        self.inner
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("instance_id", &self.inner.instance_id)
            .field("connectors", &self.inner.connectors.len())
            .field("workflows", &self.inner.workflows.len())
            .finish()
    }
}
