//! Execution and subscription core for mockql.
//!
//! This crate serves GraphQL operations from mock data:
//! - `schema`: Type system model lowered from SDL
//! - `operation`: Operation model and parsing
//! - `mock`: Mock rules and the mock resolver
//! - `handler`: Field handlers for side-effecting root fields
//! - `executor`: Operation execution with null propagation
//! - `pubsub`: Event publishing
//! - `registry`: Subscription registry
//! - `protocol`: WebSocket sub-protocol codec
//! - `connection`: Connection lifecycle and drain
//!
//! ```ignore
//! use mockql_runtime::{Executor, HandlerMap, MockConfig, MockResolver, MockRules, TypeSystem};
//!
//! let schema = TypeSystem::parse(sdl)?;
//! let rules = MockRules::new();
//! rules.check(&schema)?;
//! let executor = Executor::new(schema, MockResolver::new(rules, MockConfig::new()), HandlerMap::new());
//!
//! let operation = executor.schema().parse_operation("{ allDays { id } }", None, None)?;
//! let response = executor.execute(&operation).await?;
//! ```

pub mod connection;
pub mod error;
pub mod executor;
pub mod handler;
pub mod mock;
pub mod operation;
pub mod protocol;
pub mod pubsub;
pub mod registry;
pub mod schema;

pub use connection::{
    Connection, ConnectionId, ConnectionManager, ConnectionState, DrainReport, ManagerConfig,
    Outbound,
};
pub use error::{
    ConnectionError, ExecutionError, ProtocolError, RegistryError, ResolutionError,
    ResolutionResult, SchemaError, SchemaResult, ValidationError,
};
pub use executor::{Executor, FieldError, PathSegment, Response};
pub use handler::{Arguments, AsyncFnHandler, Context, FieldHandler, FnHandler, HandlerMap};
pub use mock::{
    FieldPath, ListSizeRange, MockConfig, MockResolver, MockRule, MockRules, MockRulesFile,
};
pub use operation::{FieldSelection, Operation, OperationKind};
pub use protocol::{ClientMessage, GraphQLRequest, Protocol, ServerMessage};
pub use pubsub::{EventStream, PublishedEvent, Publisher};
pub use registry::{EventSink, RegistrationId, SubscriptionRegistration, SubscriptionRegistry};
pub use schema::{FieldDef, SchemaHandle, TypeDef, TypeRef, TypeSystem};
