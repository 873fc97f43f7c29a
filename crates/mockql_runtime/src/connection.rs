//! Connection lifecycle.
//!
//! A [`Connection`] moves `Open -> Closing -> Closed` and never back. While
//! `Open` it accepts start and stop messages. While `Closing` it takes no new
//! work and receives no subscription events, but queries already running
//! still deliver their results. `Closed` purges its registrations. A
//! transport close or error also passes through `Closing`, but does not wait
//! for running queries.
//!
//! The [`ConnectionManager`] owns the live set and runs the drain.

use crate::error::{ConnectionError, ValidationError};
use crate::executor::{Executor, FieldError, Response};
use crate::operation::OperationKind;
use crate::protocol::{ClientMessage, GraphQLRequest, ServerMessage};
use crate::registry::{EventSink, SubscriptionRegistry};
use indexmap::IndexMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Server-unique connection id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// Messages queued for the transport to write.
pub type Outbound = mpsc::UnboundedReceiver<ServerMessage>;

/// One client connection.
pub struct Connection {
    id: ConnectionId,
    state: Mutex<ConnectionState>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    in_flight: TaskTracker,
    closed: CancellationToken,
}

impl Connection {
    fn new(id: ConnectionId) -> (Arc<Self>, Outbound) {
        let (outbound, receiver) = mpsc::unbounded_channel();
        let connection = Arc::new(Self {
            id,
            state: Mutex::new(ConnectionState::Open),
            outbound,
            in_flight: TaskTracker::new(),
            closed: CancellationToken::new(),
        });
        (connection, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.lock_state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Cancelled once the connection is closed. The transport stops on it.
    pub fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    /// Queues a message. Refused once closed.
    pub fn send(&self, message: ServerMessage) -> bool {
        if self.state() == ConnectionState::Closed {
            return false;
        }
        self.outbound.send(message).is_ok()
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns `task` as in-flight work, unless the connection stopped
    /// accepting work.
    fn spawn_if_open<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = self.lock_state();
        if *state != ConnectionState::Open {
            return false;
        }
        self.in_flight.spawn(task);
        true
    }

    /// Moves to `Closing`. Returns false if already past `Open`.
    fn begin_closing(&self) -> bool {
        let mut state = self.lock_state();
        if *state != ConnectionState::Open {
            return false;
        }
        *state = ConnectionState::Closing;
        self.in_flight.close();
        true
    }

    /// Moves to `Closed`. Returns false if already closed.
    fn mark_closed(&self) -> bool {
        let mut state = self.lock_state();
        if *state == ConnectionState::Closed {
            return false;
        }
        *state = ConnectionState::Closed;
        self.in_flight.close();
        self.closed.cancel();
        true
    }
}

impl EventSink for Connection {
    fn deliver_event(&self, message: ServerMessage) -> bool {
        let state = self.lock_state();
        if *state != ConnectionState::Open {
            return false;
        }
        self.outbound.send(message).is_ok()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

/// Connection manager configuration.
#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    /// Upper bound on waiting for in-flight work during a drain.
    pub drain_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl ManagerConfig {
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}

/// Outcome of [`ConnectionManager::initiate_drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Connections that were live when the drain began.
    pub connections: usize,
    /// Subscriptions that were sent `complete`.
    pub subscriptions_completed: usize,
    /// In-flight work was still running at the deadline.
    pub timed_out: bool,
}

/// Owns the live connections.
pub struct ConnectionManager {
    config: ManagerConfig,
    executor: Arc<Executor>,
    registry: Arc<SubscriptionRegistry>,
    connections: Mutex<IndexMap<ConnectionId, Arc<Connection>>>,
    next_id: AtomicU64,
    draining: CancellationToken,
    requests: TaskTracker,
}

impl ConnectionManager {
    pub fn new(
        executor: Arc<Executor>,
        registry: Arc<SubscriptionRegistry>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            config,
            executor,
            registry,
            connections: Mutex::new(IndexMap::new()),
            next_id: AtomicU64::new(1),
            draining: CancellationToken::new(),
            requests: TaskTracker::new(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn is_draining(&self) -> bool {
        self.draining.is_cancelled()
    }

    /// Cancelled when a drain begins.
    pub fn draining(&self) -> &CancellationToken {
        &self.draining
    }

    pub fn connection_count(&self) -> usize {
        self.lock_connections().len()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.lock_connections().get(&id).cloned()
    }

    fn lock_connections(&self) -> MutexGuard<'_, IndexMap<ConnectionId, Arc<Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Accepts a new connection. Refused once draining.
    pub fn open(&self) -> Result<(Arc<Connection>, Outbound), ConnectionError> {
        let mut connections = self.lock_connections();
        if self.is_draining() {
            return Err(ConnectionError::Draining);
        }
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (connection, outbound) = Connection::new(id);
        connections.insert(id, Arc::clone(&connection));
        drop(connections);

        tracing::info!(connection = %id, "connection opened");
        Ok((connection, outbound))
    }

    /// Handles one decoded client message.
    pub async fn handle_message(&self, connection: &Arc<Connection>, message: ClientMessage) {
        match message {
            ClientMessage::ConnectionInit { .. } => {
                connection.send(ServerMessage::ConnectionAck);
            }
            ClientMessage::Ping => {
                connection.send(ServerMessage::Pong);
            }
            ClientMessage::Pong => {}
            ClientMessage::ConnectionTerminate => self.close(connection).await,
            ClientMessage::Start { id, payload } => self.start(connection, id, payload).await,
            ClientMessage::Stop { id } => {
                if self.registry.unregister_operation(connection.id(), &id).await {
                    tracing::debug!(connection = %connection.id(), operation_id = %id, "subscription stopped");
                }
            }
        }
    }

    async fn start(&self, connection: &Arc<Connection>, id: String, request: GraphQLRequest) {
        if !connection.is_open() {
            connection.send(ServerMessage::Error {
                id,
                errors: vec![draining_error()],
            });
            return;
        }

        let schema = self.executor.schema();
        let operation = match schema.parse_operation(
            &request.query,
            request.operation_name.as_deref(),
            request.variables,
        ) {
            Ok(operation) => operation,
            Err(error) => {
                tracing::debug!(connection = %connection.id(), operation_id = %id, %error, "operation rejected");
                connection.send(ServerMessage::Error {
                    id,
                    errors: vec![error.into()],
                });
                return;
            }
        };

        if operation.kind == OperationKind::Subscription {
            let sink: Arc<dyn EventSink> = connection.clone();
            match self
                .registry
                .register(connection.id(), Arc::downgrade(&sink), id.clone(), operation)
                .await
            {
                Ok(registration) => {
                    // A drain may have started while registering.
                    if !connection.is_open() && self.registry.unregister(registration.id).await {
                        connection.send(ServerMessage::Error {
                            id,
                            errors: vec![draining_error()],
                        });
                    }
                }
                Err(error) => {
                    connection.send(ServerMessage::Error {
                        id,
                        errors: vec![error.into()],
                    });
                }
            }
            return;
        }

        let executor = Arc::clone(&self.executor);
        let target = Arc::clone(connection);
        let operation_id = id.clone();
        let spawned = connection.spawn_if_open(async move {
            let response = executor
                .execute(&operation)
                .await
                .unwrap_or_else(Response::from);
            target.send(ServerMessage::Next {
                id: operation_id.clone(),
                payload: response,
            });
            target.send(ServerMessage::Complete { id: operation_id });
        });
        if !spawned {
            connection.send(ServerMessage::Error {
                id,
                errors: vec![draining_error()],
            });
        }
    }

    /// Closes a connection after a transport close or error.
    ///
    /// The connection passes through `Closing`, so no event is delivered
    /// while its registrations are purged. The transport is gone, so running
    /// queries are not waited for.
    pub async fn close(&self, connection: &Arc<Connection>) {
        if connection.state() == ConnectionState::Closed {
            return;
        }
        connection.begin_closing();
        let purged = self.registry.purge_connection(connection.id()).await;
        if !connection.mark_closed() {
            return;
        }
        self.lock_connections().shift_remove(&connection.id());
        tracing::info!(
            connection = %connection.id(),
            subscriptions = purged.len(),
            "connection closed"
        );
    }

    /// Drains every connection.
    ///
    /// New connections and requests are refused from here on. Running
    /// queries and mutations get up to the drain timeout to finish, then
    /// every open subscription is sent `complete` and every connection is
    /// closed.
    pub async fn initiate_drain(&self) -> DrainReport {
        self.draining.cancel();
        self.requests.close();

        let connections: Vec<Arc<Connection>> = self.lock_connections().values().cloned().collect();
        for connection in &connections {
            connection.begin_closing();
        }
        tracing::info!(connections = connections.len(), "drain started");

        let in_flight = async {
            for connection in &connections {
                connection.in_flight.wait().await;
            }
            self.requests.wait().await;
        };
        let timed_out = tokio::time::timeout(self.config.drain_timeout, in_flight)
            .await
            .is_err();
        if timed_out {
            tracing::warn!(
                timeout = ?self.config.drain_timeout,
                "drain timed out with work still in flight"
            );
        }

        let mut report = DrainReport {
            connections: connections.len(),
            subscriptions_completed: 0,
            timed_out,
        };
        for connection in &connections {
            for id in self.registry.purge_connection(connection.id()).await {
                connection.send(ServerMessage::Complete { id });
                report.subscriptions_completed += 1;
            }
            connection.mark_closed();
            self.lock_connections().shift_remove(&connection.id());
        }

        tracing::info!(
            connections = report.connections,
            subscriptions = report.subscriptions_completed,
            timed_out = report.timed_out,
            "drain finished"
        );
        report
    }

    /// Runs a one-shot query or mutation outside any connection.
    pub async fn execute_request(
        &self,
        request: GraphQLRequest,
    ) -> Result<Response, ConnectionError> {
        let _token = self.requests.token();
        if self.is_draining() {
            return Err(ConnectionError::Draining);
        }

        let schema = self.executor.schema();
        let operation = match schema.parse_operation(
            &request.query,
            request.operation_name.as_deref(),
            request.variables,
        ) {
            Ok(operation) => operation,
            Err(error) => return Ok(Response::error(error.into())),
        };
        if operation.kind == OperationKind::Subscription {
            return Ok(Response::error(ValidationError::SubscriptionOverHttp.into()));
        }

        Ok(self
            .executor
            .execute(&operation)
            .await
            .unwrap_or_else(Response::from))
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("connections", &self.connection_count())
            .field("draining", &self.is_draining())
            .finish()
    }
}

fn draining_error() -> FieldError {
    FieldError::new(ConnectionError::Draining.to_string()).with_code("SERVER_DRAINING")
}
