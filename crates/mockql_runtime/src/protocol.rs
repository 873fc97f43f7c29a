//! WebSocket sub-protocols.
//!
//! Two sub-protocols are spoken: the legacy `graphql-ws` protocol
//! (`start`/`stop`/`data`/`ka`) and `graphql-transport-ws`
//! (`subscribe`/`complete`/`next`/`ping`/`pong`). Both decode into
//! [`ClientMessage`] and encode from [`ServerMessage`], so the connection
//! manager never sees wire details.

use crate::error::ProtocolError;
use crate::executor::{FieldError, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An operation request, as sent over HTTP or inside a start message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }

    pub fn variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// Client-to-server messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    ConnectionInit { payload: Option<Value> },
    Start { id: String, payload: GraphQLRequest },
    Stop { id: String },
    ConnectionTerminate,
    Ping,
    Pong,
}

/// Server-to-client messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    ConnectionAck,
    ConnectionError { message: String },
    KeepAlive,
    Pong,
    Next { id: String, payload: Response },
    Error { id: String, errors: Vec<FieldError> },
    Complete { id: String },
}

/// A negotiated sub-protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    GraphqlWs,
    GraphqlTransportWs,
}

impl Protocol {
    pub const ALL: [Protocol; 2] = [Protocol::GraphqlTransportWs, Protocol::GraphqlWs];

    pub const fn name(self) -> &'static str {
        match self {
            Self::GraphqlWs => "graphql-ws",
            Self::GraphqlTransportWs => "graphql-transport-ws",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|protocol| protocol.name() == name.trim())
    }

    /// Picks the first offered sub-protocol that is supported.
    pub fn negotiate<'a>(offered: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        offered.into_iter().find_map(Self::from_name)
    }

    pub fn decode(self, text: &str) -> Result<ClientMessage, ProtocolError> {
        let message = match self {
            Self::GraphqlWs => match serde_json::from_str::<LegacyClient>(text)? {
                LegacyClient::ConnectionInit { payload } => ClientMessage::ConnectionInit { payload },
                LegacyClient::Start { id, payload } => ClientMessage::Start { id, payload },
                LegacyClient::Stop { id } => ClientMessage::Stop { id },
                LegacyClient::ConnectionTerminate {} => ClientMessage::ConnectionTerminate,
            },
            Self::GraphqlTransportWs => match serde_json::from_str::<TransportClient>(text)? {
                TransportClient::ConnectionInit { payload } => {
                    ClientMessage::ConnectionInit { payload }
                }
                TransportClient::Subscribe { id, payload } => ClientMessage::Start { id, payload },
                TransportClient::Complete { id } => ClientMessage::Stop { id },
                TransportClient::Ping {} => ClientMessage::Ping,
                TransportClient::Pong {} => ClientMessage::Pong,
            },
        };
        Ok(message)
    }

    /// Encodes a message. `None` if this sub-protocol has no such message;
    /// the transport closes the socket instead.
    pub fn encode(self, message: &ServerMessage) -> Result<Option<String>, ProtocolError> {
        let text = match self {
            Self::GraphqlWs => {
                let wire = match message {
                    ServerMessage::ConnectionAck => LegacyServer::ConnectionAck,
                    ServerMessage::ConnectionError { message } => LegacyServer::ConnectionError {
                        payload: ErrorPayload { message },
                    },
                    ServerMessage::KeepAlive => LegacyServer::Ka,
                    // Legacy clients have no ping; a pong is never owed.
                    ServerMessage::Pong => return Ok(None),
                    ServerMessage::Next { id, payload } => LegacyServer::Data { id, payload },
                    ServerMessage::Error { id, errors } => LegacyServer::Error {
                        id,
                        payload: errors,
                    },
                    ServerMessage::Complete { id } => LegacyServer::Complete { id },
                };
                serde_json::to_string(&wire)?
            }
            Self::GraphqlTransportWs => {
                let wire = match message {
                    ServerMessage::ConnectionAck => TransportServer::ConnectionAck,
                    ServerMessage::ConnectionError { .. } => return Ok(None),
                    ServerMessage::KeepAlive => TransportServer::Ping,
                    ServerMessage::Pong => TransportServer::Pong,
                    ServerMessage::Next { id, payload } => TransportServer::Next { id, payload },
                    ServerMessage::Error { id, errors } => TransportServer::Error {
                        id,
                        payload: errors,
                    },
                    ServerMessage::Complete { id } => TransportServer::Complete { id },
                };
                serde_json::to_string(&wire)?
            }
        };
        Ok(Some(text))
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LegacyClient {
    ConnectionInit {
        #[serde(default)]
        payload: Option<Value>,
    },
    Start {
        id: String,
        payload: GraphQLRequest,
    },
    Stop {
        id: String,
    },
    ConnectionTerminate {},
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TransportClient {
    ConnectionInit {
        #[serde(default)]
        payload: Option<Value>,
    },
    Subscribe {
        id: String,
        payload: GraphQLRequest,
    },
    Complete {
        id: String,
    },
    Ping {},
    Pong {},
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    message: &'a str,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LegacyServer<'a> {
    ConnectionAck,
    ConnectionError { payload: ErrorPayload<'a> },
    Ka,
    Data { id: &'a str, payload: &'a Response },
    Error { id: &'a str, payload: &'a [FieldError] },
    Complete { id: &'a str },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TransportServer<'a> {
    ConnectionAck,
    Ping,
    Pong,
    Next { id: &'a str, payload: &'a Response },
    Error { id: &'a str, payload: &'a [FieldError] },
    Complete { id: &'a str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(protocol: Protocol, message: &ServerMessage) -> Value {
        let text = protocol.encode(message).unwrap().unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_negotiate() {
        assert_eq!(
            Protocol::negotiate(["graphql-ws"]),
            Some(Protocol::GraphqlWs)
        );
        assert_eq!(
            Protocol::negotiate(["chat", " graphql-transport-ws", "graphql-ws"]),
            Some(Protocol::GraphqlTransportWs)
        );
        assert_eq!(Protocol::negotiate(["chat"]), None);
        assert_eq!(Protocol::from_name("graphql-ws"), Some(Protocol::GraphqlWs));
    }

    #[test]
    fn test_decode_legacy() {
        let protocol = Protocol::GraphqlWs;
        assert_eq!(
            protocol.decode(r#"{"type":"connection_init","payload":{}}"#).unwrap(),
            ClientMessage::ConnectionInit {
                payload: Some(json!({}))
            }
        );
        assert_eq!(
            protocol
                .decode(r#"{"id":"1","type":"start","payload":{"query":"subscription { newDay { id } }","variables":null}}"#)
                .unwrap(),
            ClientMessage::Start {
                id: "1".into(),
                payload: GraphQLRequest::new("subscription { newDay { id } }"),
            }
        );
        assert_eq!(
            protocol.decode(r#"{"id":"1","type":"stop"}"#).unwrap(),
            ClientMessage::Stop { id: "1".into() }
        );
        assert_eq!(
            protocol.decode(r#"{"type":"connection_terminate"}"#).unwrap(),
            ClientMessage::ConnectionTerminate
        );
        assert!(matches!(
            protocol.decode(r#"{"type":"subscribe","id":"1"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_transport() {
        let protocol = Protocol::GraphqlTransportWs;
        assert_eq!(
            protocol
                .decode(r#"{"id":"a","type":"subscribe","payload":{"query":"{ totalDays }","operationName":"Q"}}"#)
                .unwrap(),
            ClientMessage::Start {
                id: "a".into(),
                payload: GraphQLRequest::new("{ totalDays }").operation_name("Q"),
            }
        );
        assert_eq!(
            protocol.decode(r#"{"id":"a","type":"complete"}"#).unwrap(),
            ClientMessage::Stop { id: "a".into() }
        );
        assert_eq!(
            protocol.decode(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        );
        assert!(protocol.decode("not json").is_err());
    }

    #[test]
    fn test_encode_messages() {
        let next = ServerMessage::Next {
            id: "1".into(),
            payload: Response::data(json!({ "totalDays": 3 })),
        };
        assert_eq!(
            encode(Protocol::GraphqlWs, &next),
            json!({ "type": "data", "id": "1", "payload": { "data": { "totalDays": 3 } } })
        );
        assert_eq!(
            encode(Protocol::GraphqlTransportWs, &next),
            json!({ "type": "next", "id": "1", "payload": { "data": { "totalDays": 3 } } })
        );

        let error = ServerMessage::Error {
            id: "2".into(),
            errors: vec![FieldError::new("bad")],
        };
        assert_eq!(
            encode(Protocol::GraphqlTransportWs, &error),
            json!({ "type": "error", "id": "2", "payload": [{ "message": "bad" }] })
        );

        assert_eq!(
            encode(Protocol::GraphqlWs, &ServerMessage::KeepAlive),
            json!({ "type": "ka" })
        );
        assert_eq!(
            encode(Protocol::GraphqlTransportWs, &ServerMessage::KeepAlive),
            json!({ "type": "ping" })
        );
        assert_eq!(
            encode(Protocol::GraphqlWs, &ServerMessage::ConnectionAck),
            json!({ "type": "connection_ack" })
        );
        assert_eq!(
            encode(
                Protocol::GraphqlWs,
                &ServerMessage::Complete { id: "3".into() }
            ),
            json!({ "type": "complete", "id": "3" })
        );
    }

    #[test]
    fn test_messages_without_encoding() {
        let rejected = ServerMessage::ConnectionError {
            message: "draining".into(),
        };
        assert_eq!(
            Protocol::GraphqlTransportWs.encode(&rejected).unwrap(),
            None
        );
        assert_eq!(
            encode(Protocol::GraphqlWs, &rejected),
            json!({ "type": "connection_error", "payload": { "message": "draining" } })
        );
        assert_eq!(Protocol::GraphqlWs.encode(&ServerMessage::Pong).unwrap(), None);
    }
}
