//! Drain behaviour of the connection manager.

use mockql_runtime::{
    ClientMessage, ConnectionManager, ConnectionState, Executor, GraphQLRequest, HandlerMap,
    ManagerConfig, MockConfig, MockResolver, MockRules, Outbound, ServerMessage,
    SubscriptionRegistry, TypeSystem,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const SKI_SCHEMA: &str = include_str!("fixtures/skiday.graphql");

#[derive(Default)]
struct Gate {
    entered: Notify,
    release: Notify,
}

/// A manager whose `totalDays` resolves to 42 once the gate is released.
fn gated_manager(gate: Arc<Gate>, config: ManagerConfig) -> Arc<ConnectionManager> {
    let schema = TypeSystem::parse(SKI_SCHEMA).unwrap();
    let mocks = MockResolver::new(MockRules::new(), MockConfig::new().seed(11));
    let mut handlers = HandlerMap::new();
    handlers.register_async("Query", "totalDays", move |_args, _ctx| {
        let gate = Arc::clone(&gate);
        async move {
            gate.entered.notify_one();
            gate.release.notified().await;
            Ok(json!(42))
        }
    });
    let executor = Arc::new(Executor::new(schema, mocks, handlers));
    let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&executor)));
    Arc::new(ConnectionManager::new(executor, registry, config))
}

fn start(id: &str, query: &str) -> ClientMessage {
    ClientMessage::Start {
        id: id.into(),
        payload: GraphQLRequest::new(query),
    }
}

fn subscribe(id: &str) -> ClientMessage {
    start(id, "subscription { newDay { id mountain } }")
}

fn drain_outbound(outbound: &mut Outbound) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = outbound.try_recv() {
        messages.push(message);
    }
    messages
}

fn complete(id: &str) -> ServerMessage {
    ServerMessage::Complete { id: id.into() }
}

#[tokio::test]
async fn test_drain_completes_subscriptions_and_in_flight_query() {
    let gate = Arc::new(Gate::default());
    let manager = gated_manager(Arc::clone(&gate), ManagerConfig::default());

    let (first, mut first_out) = manager.open().unwrap();
    let (second, mut second_out) = manager.open().unwrap();
    manager.handle_message(&first, subscribe("s1")).await;
    manager.handle_message(&first, subscribe("s2")).await;
    manager.handle_message(&second, subscribe("s3")).await;
    manager.handle_message(&first, start("q", "{ totalDays }")).await;
    assert_eq!(manager.registry().len().await, 3);
    gate.entered.notified().await;

    let drain = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.initiate_drain().await }
    });
    while first.state() != ConnectionState::Closing {
        tokio::task::yield_now().await;
    }
    assert_eq!(second.state(), ConnectionState::Closing);

    // No events once closing, and no new work.
    let delivered = manager
        .registry()
        .publish("newDay", json!({ "id": "1", "mountain": "Alta" }))
        .await;
    assert_eq!(delivered, 0);
    manager.handle_message(&second, subscribe("late")).await;
    assert!(manager.open().is_err());

    gate.release.notify_one();
    let report = drain.await.unwrap();
    assert_eq!(report.connections, 2);
    assert_eq!(report.subscriptions_completed, 3);
    assert!(!report.timed_out);

    assert_eq!(
        drain_outbound(&mut first_out),
        [
            ServerMessage::Next {
                id: "q".into(),
                payload: mockql_runtime::Response::data(json!({ "totalDays": 42 })),
            },
            complete("q"),
            complete("s1"),
            complete("s2"),
        ]
    );

    let second_messages = drain_outbound(&mut second_out);
    assert_eq!(second_messages.len(), 2);
    assert!(matches!(
        &second_messages[0],
        ServerMessage::Error { id, .. } if id == "late"
    ));
    assert_eq!(second_messages[1], complete("s3"));

    assert_eq!(first.state(), ConnectionState::Closed);
    assert_eq!(second.state(), ConnectionState::Closed);
    assert!(first.closed().is_cancelled());
    assert!(manager.registry().is_empty().await);
    assert_eq!(manager.connection_count(), 0);
}

#[tokio::test]
async fn test_drain_timeout_forces_close() {
    let gate = Arc::new(Gate::default());
    let config = ManagerConfig::default().drain_timeout(Duration::from_millis(50));
    let manager = gated_manager(gate, config);

    let (connection, mut outbound) = manager.open().unwrap();
    manager.handle_message(&connection, subscribe("s")).await;
    manager
        .handle_message(&connection, start("stuck", "{ totalDays }"))
        .await;

    let report = manager.initiate_drain().await;
    assert!(report.timed_out);
    assert_eq!(report.subscriptions_completed, 1);
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert_eq!(drain_outbound(&mut outbound), [complete("s")]);
}

#[tokio::test]
async fn test_drain_waits_for_http_requests() {
    let gate = Arc::new(Gate::default());
    let manager = gated_manager(Arc::clone(&gate), ManagerConfig::default());

    let request = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move {
            manager
                .execute_request(GraphQLRequest::new("{ totalDays }"))
                .await
        }
    });
    gate.entered.notified().await;

    let drain = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.initiate_drain().await }
    });
    while !manager.is_draining() {
        tokio::task::yield_now().await;
    }
    gate.release.notify_one();

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.data, Some(json!({ "totalDays": 42 })));
    assert!(!drain.await.unwrap().timed_out);
}
