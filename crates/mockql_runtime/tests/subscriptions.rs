//! End-to-end subscription delivery through the connection manager.

use mockql_runtime::{
    pubsub, ClientMessage, ConnectionManager, Executor, GraphQLRequest, HandlerMap,
    ManagerConfig, MockResolver, MockRulesFile, ServerMessage, SubscriptionRegistry, TypeSystem,
};
use serde_json::json;
use std::sync::Arc;

const SKI_SCHEMA: &str = include_str!("fixtures/skiday.graphql");
const SKI_MOCKS: &str = include_str!("fixtures/skiday-mocks.json");

fn manager() -> Arc<ConnectionManager> {
    let schema = TypeSystem::parse(SKI_SCHEMA).unwrap();
    let (rules, config) = MockRulesFile::from_json(SKI_MOCKS)
        .unwrap()
        .into_rules()
        .unwrap();
    rules.check(&schema).unwrap();
    let executor = Arc::new(Executor::new(
        schema,
        MockResolver::new(rules, config.seed(5)),
        HandlerMap::new(),
    ));
    let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&executor)));
    Arc::new(ConnectionManager::new(
        executor,
        registry,
        ManagerConfig::default(),
    ))
}

fn start(id: &str, query: &str) -> ClientMessage {
    ClientMessage::Start {
        id: id.into(),
        payload: GraphQLRequest::new(query),
    }
}

#[tokio::test]
async fn test_events_reach_matching_subscribers_only() {
    let manager = manager();
    let (first, mut first_out) = manager.open().unwrap();
    let (second, mut second_out) = manager.open().unwrap();

    manager
        .handle_message(&first, start("a", "subscription { newDay { id date } }"))
        .await;
    manager
        .handle_message(
            &second,
            start("b", "subscription OnDay { day: newDay { mountain conditions } }"),
        )
        .await;

    let delivered = manager
        .registry()
        .publish(
            "newDay",
            json!({ "id": "1", "mountain": "Snowbird", "conditions": null }),
        )
        .await;
    assert_eq!(delivered, 2);

    // `date` was not in the payload, so it comes from the Date rule.
    assert_eq!(
        first_out.recv().await,
        Some(ServerMessage::Next {
            id: "a".into(),
            payload: mockql_runtime::Response::data(
                json!({ "newDay": { "id": "1", "date": "1/2/2025" } })
            ),
        })
    );
    assert_eq!(
        second_out.recv().await,
        Some(ServerMessage::Next {
            id: "b".into(),
            payload: mockql_runtime::Response::data(
                json!({ "day": { "mountain": "Snowbird", "conditions": null } })
            ),
        })
    );

    manager.close(&second).await;
    let delivered = manager
        .registry()
        .publish("newDay", json!({ "id": "2", "mountain": "Alta" }))
        .await;
    assert_eq!(delivered, 1);
    assert!(first_out.recv().await.is_some());
}

#[tokio::test]
async fn test_stop_ends_delivery() {
    let manager = manager();
    let (connection, mut outbound) = manager.open().unwrap();
    manager
        .handle_message(&connection, start("a", "subscription { newDay { id } }"))
        .await;
    manager
        .handle_message(&connection, ClientMessage::Stop { id: "a".into() })
        .await;

    let delivered = manager
        .registry()
        .publish("newDay", json!({ "id": "1", "mountain": "Alta" }))
        .await;
    assert_eq!(delivered, 0);
    assert!(outbound.try_recv().is_err());
}

#[tokio::test]
async fn test_publisher_pump_feeds_registry() {
    let manager = manager();
    let (connection, mut outbound) = manager.open().unwrap();
    manager
        .handle_message(&connection, start("a", "subscription { newDay { id } }"))
        .await;

    let (publisher, events) = pubsub::channel();
    let pump = tokio::spawn(Arc::clone(manager.registry()).run_events(events));
    assert!(publisher.publish("newDay", json!({ "id": "9", "mountain": "Alta" })));

    assert_eq!(
        outbound.recv().await,
        Some(ServerMessage::Next {
            id: "a".into(),
            payload: mockql_runtime::Response::data(json!({ "newDay": { "id": "9" } })),
        })
    );
    drop(publisher);
    pump.await.unwrap();
}

#[tokio::test]
async fn test_queries_use_mock_rules_file() {
    let manager = manager();
    let response = manager
        .execute_request(GraphQLRequest::new("{ allDays { mountain date } }"))
        .await
        .unwrap();

    let days = response.data.unwrap()["allDays"].as_array().unwrap().clone();
    assert!((1..=15).contains(&days.len()));
    for day in days {
        assert_eq!(day, json!({ "mountain": "Cool date", "date": "1/2/2025" }));
    }
}
