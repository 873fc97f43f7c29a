//! Subscription registry.
//!
//! Tracks open subscriptions and fans published events out to them.
//! Registration, removal and publishing are serialized through one async
//! mutex, held for the whole of a publish: once [`SubscriptionRegistry::unregister`]
//! returns, no later publish reaches that registration.

use crate::connection::ConnectionId;
use crate::error::RegistryError;
use crate::executor::{Executor, Response};
use crate::operation::{Operation, OperationKind};
use crate::protocol::ServerMessage;
use crate::pubsub::EventStream;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

/// Receives subscription events for one connection.
pub trait EventSink: Send + Sync {
    /// Delivers one event. Returns false if the sink no longer accepts events.
    fn deliver_event(&self, message: ServerMessage) -> bool;
}

/// Server-unique registration id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One open subscription.
#[derive(Clone)]
pub struct SubscriptionRegistration {
    pub id: RegistrationId,
    /// Client-supplied id, unique per connection.
    pub operation_id: String,
    pub connection: ConnectionId,
    pub root_field: String,
    pub operation: Arc<Operation>,
    sink: Weak<dyn EventSink>,
}

impl fmt::Debug for SubscriptionRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistration")
            .field("id", &self.id)
            .field("operation_id", &self.operation_id)
            .field("connection", &self.connection)
            .field("root_field", &self.root_field)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    /// In registration order.
    registrations: IndexMap<RegistrationId, SubscriptionRegistration>,
    by_connection: FxHashMap<ConnectionId, IndexMap<String, RegistrationId>>,
}

impl RegistryState {
    fn remove(&mut self, id: RegistrationId) -> Option<SubscriptionRegistration> {
        let registration = self.registrations.shift_remove(&id)?;
        if let Some(operations) = self.by_connection.get_mut(&registration.connection) {
            operations.shift_remove(&registration.operation_id);
            if operations.is_empty() {
                self.by_connection.remove(&registration.connection);
            }
        }
        Some(registration)
    }
}

/// The set of live subscriptions.
pub struct SubscriptionRegistry {
    executor: Arc<Executor>,
    state: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self {
            executor,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Opens a subscription for `connection`.
    pub async fn register(
        &self,
        connection: ConnectionId,
        sink: Weak<dyn EventSink>,
        operation_id: impl Into<String>,
        operation: Operation,
    ) -> Result<SubscriptionRegistration, RegistryError> {
        if operation.kind != OperationKind::Subscription {
            return Err(RegistryError::NotASubscription(operation.kind));
        }
        let operation_id = operation_id.into();
        let root_field = operation.root_field_name().unwrap_or_default().to_owned();

        let mut state = self.state.lock().await;
        let operations = state.by_connection.entry(connection).or_default();
        if operations.contains_key(&operation_id) {
            return Err(RegistryError::DuplicateSubscription { operation_id });
        }

        let id = RegistrationId(state.next_id);
        state.next_id += 1;
        state
            .by_connection
            .entry(connection)
            .or_default()
            .insert(operation_id.clone(), id);

        let registration = SubscriptionRegistration {
            id,
            operation_id,
            connection,
            root_field,
            operation: Arc::new(operation),
            sink,
        };
        state.registrations.insert(id, registration.clone());

        tracing::debug!(
            %connection,
            registration = %id,
            operation_id = %registration.operation_id,
            root_field = %registration.root_field,
            "subscription registered"
        );
        Ok(registration)
    }

    /// Removes a registration. Removing an unknown id is a no-op.
    pub async fn unregister(&self, id: RegistrationId) -> bool {
        let removed = self.state.lock().await.remove(id);
        if let Some(registration) = &removed {
            tracing::debug!(
                connection = %registration.connection,
                registration = %id,
                "subscription removed"
            );
        }
        removed.is_some()
    }

    /// Removes the registration a connection opened as `operation_id`.
    pub async fn unregister_operation(&self, connection: ConnectionId, operation_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let id = state
            .by_connection
            .get(&connection)
            .and_then(|operations| operations.get(operation_id))
            .copied();
        match id {
            Some(id) => state.remove(id).is_some(),
            None => false,
        }
    }

    /// Delivers `payload` to every registration on `root_field`, in
    /// registration order. Returns the number of deliveries.
    pub async fn publish(&self, root_field: &str, payload: Value) -> usize {
        let state = self.state.lock().await;
        let mut delivered = 0;
        for registration in state
            .registrations
            .values()
            .filter(|registration| registration.root_field == root_field)
        {
            let Some(sink) = registration.sink.upgrade() else {
                continue;
            };
            let response = self
                .executor
                .execute_event(&registration.operation, payload.clone())
                .await
                .unwrap_or_else(Response::from);
            let message = ServerMessage::Next {
                id: registration.operation_id.clone(),
                payload: response,
            };
            if sink.deliver_event(message) {
                delivered += 1;
            }
        }
        tracing::debug!(root_field, delivered, "event published");
        delivered
    }

    /// Removes every registration of `connection`, returning their client
    /// operation ids in registration order.
    pub async fn purge_connection(&self, connection: ConnectionId) -> Vec<String> {
        let mut state = self.state.lock().await;
        let Some(operations) = state.by_connection.remove(&connection) else {
            return Vec::new();
        };
        for id in operations.values() {
            state.registrations.shift_remove(id);
        }
        let purged: Vec<String> = operations.into_keys().collect();
        if !purged.is_empty() {
            tracing::debug!(%connection, count = purged.len(), "subscriptions purged");
        }
        purged
    }

    /// Client operation ids open on `connection`.
    pub async fn operations(&self, connection: ConnectionId) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .by_connection
            .get(&connection)
            .map(|operations| operations.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.registrations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Publishes every event from `events` until the stream ends.
    pub async fn run_events(self: Arc<Self>, mut events: EventStream) {
        while let Some(event) = events.next().await {
            self.publish(&event.root_field, event.payload).await;
        }
        tracing::debug!("event stream closed");
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry").finish_non_exhaustive()
    }
}
