//! Error types for the mockql runtime.
//!
//! Each concern gets its own enum so callers can tell a fatal startup
//! problem ([`SchemaError`]) from a per-operation one ([`ValidationError`],
//! [`ResolutionError`], [`RegistryError`]).

use crate::executor::FieldError;
use crate::operation::OperationKind;
use thiserror::Error;

/// Errors raised while loading a schema or its mock configuration.
///
/// These are fatal: a server must not start with a schema that fails here.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("schema is invalid:\n{0}")]
    Invalid(String),

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("type {0} is not an object type")]
    NotAnObject(String),

    #[error("unknown field {field} on type {parent}")]
    UnknownField { parent: String, field: String },

    #[error("{kind} type {name} is not supported")]
    UnsupportedType { name: String, kind: &'static str },

    #[error("schema does not declare a {0} root type")]
    MissingRoot(OperationKind),

    #[error("custom scalar {0} has no mock rule and no registered formatter")]
    UnresolvableScalar(String),

    #[error("invalid mock rule for {target}: {message}")]
    InvalidMockRule { target: String, message: String },
}

impl SchemaError {
    pub fn invalid_rule(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidMockRule {
            target: target.into(),
            message: message.into(),
        }
    }
}

/// A client operation does not fit the schema.
///
/// Reported to the offending operation only; the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0}")]
    Document(String),

    #[error("Unknown operation named \"{0}\"")]
    UnknownOperation(String),

    #[error("Schema does not support {0} operations")]
    UnsupportedOperation(OperationKind),

    #[error("Cannot query field \"{field}\" on type \"{parent}\"")]
    UnknownField { parent: String, field: String },

    #[error("Unknown argument \"{argument}\" on field \"{parent}.{field}\"")]
    UnknownArgument {
        parent: String,
        field: String,
        argument: String,
    },

    #[error("Field \"{parent}.{field}\" argument \"{argument}\" is required")]
    MissingArgument {
        parent: String,
        field: String,
        argument: String,
    },

    #[error("Field \"{field}\" of type \"{ty}\" must have a selection of subfields")]
    MissingSelection { field: String, ty: String },

    #[error("Field \"{field}\" must not have a selection since type \"{ty}\" has no subfields")]
    LeafSelection { field: String, ty: String },

    #[error("Variable \"${0}\" of required type was not provided")]
    MissingVariable(String),

    #[error("Subscription operations require a streaming connection")]
    SubscriptionOverHttp,
}

impl ValidationError {
    /// Error code reported in the `extensions.code` of a response error.
    pub const CODE: &'static str = "GRAPHQL_VALIDATION_FAILED";
}

impl From<ValidationError> for FieldError {
    fn from(error: ValidationError) -> Self {
        FieldError::new(error.to_string()).with_code(ValidationError::CODE)
    }
}

/// Failure to produce the value of a single field.
///
/// Absorbed by null propagation unless it reaches the response root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Failed to parse argument '{0}': {1}")]
    ArgumentParse(String, String),

    #[error("Expected a value of type {expected}, found {found}")]
    InvalidValue { expected: String, found: String },

    #[error("No mock generator for scalar {0}")]
    NoGenerator(String),

    #[error("Cannot return null for non-nullable field {0}.")]
    NullForNonNull(String),

    #[error("{0}")]
    Custom(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResolutionError {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    pub(crate) fn invalid_value(expected: impl Into<String>, found: &serde_json::Value) -> Self {
        let found = match found {
            serde_json::Value::Null => "null".to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => format!("\"{s}\""),
            serde_json::Value::Array(_) => "a list".to_string(),
            serde_json::Value::Object(_) => "an object".to_string(),
        };
        Self::InvalidValue {
            expected: expected.into(),
            found,
        }
    }
}

/// Operation rejected before it ran.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("operation failed validation ({} error(s))", .0.len())]
    Validation(Vec<ValidationError>),
}

impl ExecutionError {
    /// Converts into response errors.
    pub fn into_field_errors(self) -> Vec<FieldError> {
        match self {
            Self::Validation(errors) => errors.into_iter().map(FieldError::from).collect(),
        }
    }
}

impl From<ValidationError> for ExecutionError {
    fn from(error: ValidationError) -> Self {
        Self::Validation(vec![error])
    }
}

/// Subscription registry failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Subscriber for {operation_id} already exists")]
    DuplicateSubscription { operation_id: String },

    #[error("Only subscription operations can be registered, got a {0}")]
    NotASubscription(OperationKind),
}

impl RegistryError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicateSubscription { .. } => "DUPLICATE_SUBSCRIPTION",
            Self::NotASubscription(_) => "BAD_REQUEST",
        }
    }
}

impl From<RegistryError> for FieldError {
    fn from(error: RegistryError) -> Self {
        let code = error.code();
        FieldError::new(error.to_string()).with_code(code)
    }
}

/// Connection lifecycle failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("server is draining and no longer accepts work")]
    Draining,
}

/// Wire message decoding failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Result type for schema loading.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for field resolution.
pub type ResolutionResult = Result<serde_json::Value, ResolutionError>;
