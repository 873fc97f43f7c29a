//! HTTP and WebSocket transport.
//!
//! Routes:
//! - `POST <path>` - queries and mutations
//! - `GET <path>` - WebSocket upgrade, or the landing page for browsers
//! - `GET /health` - health check

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{Sink, SinkExt, StreamExt};
use mockql_runtime::{
    ConnectionManager, FieldError, GraphQLRequest, Outbound, Protocol,
    Response as GraphQLResponse, ServerMessage,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;

/// Close code sent when the server refuses a socket while draining.
const CLOSE_DRAINING: u16 = 1012;

/// Shared state for all routes.
#[derive(Debug, Clone)]
pub struct AppState {
    pub manager: Arc<ConnectionManager>,
    pub config: Arc<ServerConfig>,
    /// Upgraded sockets and their writers, waited on at shutdown.
    pub sockets: TaskTracker,
}

impl AppState {
    pub fn new(manager: Arc<ConnectionManager>, config: ServerConfig) -> Self {
        Self {
            manager,
            config: Arc::new(config),
            sockets: TaskTracker::new(),
        }
    }

    /// Waits up to `timeout` for every socket to flush and finish.
    ///
    /// Returns false if some were still running when the timeout hit.
    pub async fn wait_for_sockets(&self, timeout: Duration) -> bool {
        self.sockets.close();
        time::timeout(timeout, self.sockets.wait()).await.is_ok()
    }
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    let path = state.config.path.clone();
    Router::new()
        .route(&path, get(graphql_get).post(graphql_post))
        .route("/health", get(health))
        .with_state(state)
}

async fn graphql_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match ws {
        Ok(ws) => upgrade(state, &headers, ws),
        Err(_) if state.config.playground => Html(landing_page(&state.config.path)).into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn graphql_post(
    State(state): State<AppState>,
    Json(request): Json<GraphQLRequest>,
) -> Response {
    debug!(
        query = %request.query.chars().take(100).collect::<String>(),
        "executing request"
    );
    match state.manager.execute_request(request).await {
        Ok(response) => {
            // Requests rejected before execution have no data at all.
            let status = if response.data.is_none() && response.has_errors() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::OK
            };
            (status, Json(response)).into_response()
        }
        Err(error) => {
            let body = GraphQLResponse::error(
                FieldError::new(error.to_string()).with_code("SERVER_DRAINING"),
            );
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Response {
    if state.manager.is_draining() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "draining" })),
        )
            .into_response()
    } else {
        Json(json!({
            "status": "healthy",
            "connections": state.manager.connection_count(),
        }))
        .into_response()
    }
}

/// Picks the sub-protocol from the upgrade request. Clients that offer none
/// we know are spoken to in the legacy protocol.
fn negotiate(headers: &HeaderMap) -> Protocol {
    let offered = headers
        .get_all("sec-websocket-protocol")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','));
    Protocol::negotiate(offered).unwrap_or(Protocol::GraphqlWs)
}

fn upgrade(state: AppState, headers: &HeaderMap, ws: WebSocketUpgrade) -> Response {
    if state.manager.is_draining() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is draining").into_response();
    }
    let protocol = negotiate(headers);
    let keepalive = state.config.keepalive;
    let sockets = state.sockets.clone();
    ws.protocols([protocol.name()]).on_upgrade(move |socket| {
        sockets.track_future(serve_socket(
            socket,
            state.manager,
            state.sockets,
            protocol,
            keepalive,
        ))
    })
}

async fn write_message<S>(
    sink: &mut S,
    protocol: Protocol,
    message: &ServerMessage,
) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match protocol.encode(message) {
        Ok(Some(text)) => sink.send(Message::Text(text.into())).await,
        Ok(None) => Ok(()),
        Err(error) => {
            warn!(%error, "dropping unencodable message");
            Ok(())
        }
    }
}

/// Sends queued messages and keep-alives until the connection closes, then
/// flushes what is left and closes the socket.
async fn write_outbound<S>(
    mut sink: S,
    mut outbound: Outbound,
    protocol: Protocol,
    keepalive: Duration,
    closed: CancellationToken,
) where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let mut ticker = time::interval(keepalive);
    ticker.tick().await;
    loop {
        let message = tokio::select! {
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
            _ = ticker.tick() => ServerMessage::KeepAlive,
            () = closed.cancelled() => break,
        };
        if write_message(&mut sink, protocol, &message).await.is_err() {
            return;
        }
    }
    // Messages queued before the close still go out.
    while let Ok(message) = outbound.try_recv() {
        if write_message(&mut sink, protocol, &message).await.is_err() {
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

async fn serve_socket(
    mut socket: WebSocket,
    manager: Arc<ConnectionManager>,
    sockets: TaskTracker,
    protocol: Protocol,
    keepalive: Duration,
) {
    let (connection, outbound) = match manager.open() {
        Ok(opened) => opened,
        Err(error) => {
            let refusal = ServerMessage::ConnectionError {
                message: error.to_string(),
            };
            let _ = write_message(&mut socket, protocol, &refusal).await;
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_DRAINING,
                    reason: "server is draining".into(),
                })))
                .await;
            return;
        }
    };
    let id = connection.id();
    debug!(connection = %id, protocol = protocol.name(), "websocket upgraded");

    let (sink, mut stream) = socket.split();
    let mut writer = sockets.spawn(write_outbound(
        sink,
        outbound,
        protocol,
        keepalive,
        connection.closed().clone(),
    ));

    let closed = connection.closed().clone();
    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            () = closed.cancelled() => break,
            _ = &mut writer => break,
        };
        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(error)) => {
                debug!(connection = %id, %error, "websocket receive failed");
                break;
            }
        };
        match protocol.decode(text.as_str()) {
            Ok(message) => manager.handle_message(&connection, message).await,
            Err(error) => {
                warn!(connection = %id, %error, "closing connection after malformed message");
                break;
            }
        }
    }

    manager.close(&connection).await;
    if !writer.is_finished() && time::timeout(Duration::from_secs(1), &mut writer).await.is_err() {
        writer.abort();
    }
    info!(connection = %id, "websocket closed");
}

/// Landing page served on `GET <path>`.
pub fn landing_page(endpoint: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>mockql</title>
    <style>
        * {{ box-sizing: border-box; }}
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 900px; margin: 0 auto; padding: 2rem; background: #f8fafc; }}
        h1 {{ color: #0f172a; border-bottom: 2px solid #6366f1; padding-bottom: 0.5rem; }}
        .info {{ background: #eef2ff; padding: 1rem 1.5rem; border-radius: 8px; border-left: 4px solid #6366f1; margin: 1.5rem 0; }}
        .info code {{ background: #e0e7ff; padding: 2px 6px; border-radius: 4px; }}
        pre {{ background: #1e293b; color: #e2e8f0; padding: 1rem; border-radius: 6px; overflow-x: auto; font-size: 0.85rem; }}
    </style>
</head>
<body>
    <h1>mockql</h1>
    <p>Every field is served from mock data generated from the schema.</p>

    <div class="info">
        <ul>
            <li><code>POST {endpoint}</code> - queries and mutations</li>
            <li><code>GET {endpoint}</code> (WebSocket) - subscriptions over <code>graphql-ws</code> or <code>graphql-transport-ws</code></li>
            <li><code>GET /health</code> - health check</li>
        </ul>
    </div>

    <h2>Query</h2>
    <pre>curl -s http://localhost:4000{endpoint} \
  -H "Content-Type: application/json" \
  -d '{{"query": "{{ allDays {{ id date mountain conditions }} }}"}}'</pre>

    <h2>Subscription</h2>
    <pre>subscription {{
  newDay {{ id date mountain }}
}}</pre>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::HeaderValue;
    use mockql_runtime::{
        ClientMessage, Executor, HandlerMap, ManagerConfig, MockConfig, MockResolver, MockRules,
        SubscriptionRegistry, TypeSystem,
    };
    use tokio::sync::mpsc;
    use tokio_util::sync::PollSender;

    fn state() -> AppState {
        let schema = TypeSystem::parse(crate::skiday::SCHEMA).unwrap();
        let mocks = MockResolver::new(
            MockRules::new().type_rule("Date", mockql_runtime::MockRule::constant(json!("1/2/2025"))),
            MockConfig::new().seed(2),
        );
        let executor = Arc::new(Executor::new(schema, mocks, HandlerMap::new()));
        let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&executor)));
        let manager = ConnectionManager::new(executor, registry, ManagerConfig::default());
        AppState::new(Arc::new(manager), ServerConfig::new())
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_post_query() {
        let response = graphql_post(
            State(state()),
            Json(GraphQLRequest::new("{ totalDays }")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await["data"]["totalDays"].is_i64());
    }

    #[tokio::test]
    async fn test_post_invalid_query() {
        let response = graphql_post(State(state()), Json(GraphQLRequest::new("{ nope }"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(
            body["errors"][0]["extensions"]["code"],
            "GRAPHQL_VALIDATION_FAILED"
        );
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn test_post_while_draining() {
        let state = state();
        state.manager.initiate_drain().await;

        let response = graphql_post(
            State(state.clone()),
            Json(GraphQLRequest::new("{ totalDays }")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body_json(response).await["errors"][0]["extensions"]["code"],
            "SERVER_DRAINING"
        );
        assert_eq!(
            health(State(state)).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_health() {
        let response = health(State(state())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "status": "healthy", "connections": 0 })
        );
    }

    #[tokio::test]
    async fn test_drain_flushes_complete_before_sockets_finish() {
        let state = state();
        let (connection, outbound) = state.manager.open().unwrap();
        state
            .manager
            .handle_message(
                &connection,
                ClientMessage::Start {
                    id: "s".into(),
                    payload: GraphQLRequest::new("subscription { newDay { id } }"),
                },
            )
            .await;

        let (tx, mut rx) = mpsc::channel(16);
        let sink = PollSender::new(tx).sink_map_err(axum::Error::new);
        state.sockets.spawn(write_outbound(
            sink,
            outbound,
            Protocol::GraphqlTransportWs,
            Duration::from_secs(60),
            connection.closed().clone(),
        ));

        let report = state.manager.initiate_drain().await;
        assert_eq!(report.subscriptions_completed, 1);
        assert!(state.wait_for_sockets(Duration::from_secs(5)).await);

        match rx.recv().await {
            Some(Message::Text(text)) => assert_eq!(
                serde_json::from_str::<serde_json::Value>(text.as_str()).unwrap(),
                json!({ "type": "complete", "id": "s" })
            ),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(rx.recv().await, Some(Message::Close(None))));
    }

    #[tokio::test]
    async fn test_wait_for_sockets_times_out() {
        let state = state();
        state.sockets.spawn(std::future::pending::<()>());
        assert!(!state.wait_for_sockets(Duration::from_millis(20)).await);
    }

    #[test]
    fn test_negotiate_protocol() {
        let mut headers = HeaderMap::new();
        assert_eq!(negotiate(&headers), Protocol::GraphqlWs);

        headers.insert(
            "sec-websocket-protocol",
            HeaderValue::from_static("chat, graphql-transport-ws"),
        );
        assert_eq!(negotiate(&headers), Protocol::GraphqlTransportWs);
    }

    #[test]
    fn test_landing_page_names_endpoint() {
        let page = landing_page("/gql");
        assert!(page.contains("POST /gql"));
        assert!(page.contains("http://localhost:4000/gql"));
    }
}
