//! Operation execution for mockql.
//!
//! Execution walks the selection top-down. Each field takes its value from the
//! subscription event payload, a registered handler, the value provided by its
//! parent, or the mock resolver, in that order. Field errors propagate
//! upward as [`PropagateNull`] until a nullable position absorbs them.

use crate::error::{
    ExecutionError, ResolutionError, ResolutionResult, SchemaResult, ValidationError,
};
use crate::handler::{Arguments, Context, HandlerMap};
use crate::mock::{FieldPath, MockResolver};
use crate::operation::{FieldSelection, Operation};
use crate::schema::{FieldDef, ObjectDef, SchemaHandle, TypeDef, TypeRef, TypeSystem};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Executes operations against the current schema.
#[derive(Debug)]
pub struct Executor {
    schema: SchemaHandle,
    mocks: MockResolver,
    handlers: HandlerMap,
}

impl Executor {
    pub fn new(schema: TypeSystem, mocks: MockResolver, handlers: HandlerMap) -> Self {
        Self {
            schema: SchemaHandle::new(schema),
            mocks,
            handlers,
        }
    }

    /// Snapshot of the current schema.
    pub fn schema(&self) -> Arc<TypeSystem> {
        self.schema.current()
    }

    pub fn mocks(&self) -> &MockResolver {
        &self.mocks
    }

    /// Swaps in a new schema after checking the mock rules against it.
    ///
    /// Operations already running keep the schema they started with.
    pub fn reload_schema(&self, next: TypeSystem) -> SchemaResult<()> {
        self.mocks.rules().check(&next)?;
        self.schema.swap(next);
        tracing::info!("schema reloaded");
        Ok(())
    }

    /// Executes a query or mutation, or one evaluation pass of a subscription.
    pub async fn execute(&self, operation: &Operation) -> Result<Response, ExecutionError> {
        self.run(operation, None).await
    }

    /// Executes a subscription with `payload` as the value of its root field.
    pub async fn execute_event(
        &self,
        operation: &Operation,
        payload: Value,
    ) -> Result<Response, ExecutionError> {
        self.run(operation, Some(payload)).await
    }

    async fn run(
        &self,
        operation: &Operation,
        payload: Option<Value>,
    ) -> Result<Response, ExecutionError> {
        let schema = self.schema.current();
        let root_type = schema
            .root_type(operation.kind)
            .ok_or(ValidationError::UnsupportedOperation(operation.kind))?;
        validate(&schema, root_type, &operation.selection)?;

        tracing::debug!(
            kind = %operation.kind,
            name = operation.name.as_deref().unwrap_or("<anonymous>"),
            "executing operation"
        );

        let ctx = Context::for_operation(operation);
        let mut completion = Completion::new(&schema, &self.mocks);

        let root_seed = match self.mocks.object_seed(&FieldPath::default(), root_type) {
            Some(Ok(seed)) => Some(seed),
            Some(Err(error)) => {
                completion.errors.push(FieldError::from(error));
                return Ok(Response::partial(Value::Null, completion.errors));
            }
            None => None,
        };

        let mut payload = payload;
        let mut data = Map::new();
        // Root fields run one after another, in selection order.
        for field in &operation.selection {
            let key = field.response_key();
            if field.name == "__typename" {
                data.insert(key.to_owned(), Value::String(root_type.to_owned()));
                continue;
            }
            let Ok(def) = schema.field(root_type, &field.name) else {
                continue;
            };

            // An event payload is the first root field's value, ahead of any handler.
            let source = if let Some(event) = payload.take() {
                Source::Resolved(Ok(event))
            } else if let Some(handler) = self.handlers.get(root_type, &field.name) {
                let args = Arguments::from_map(field.arguments.clone());
                Source::Resolved(handler.resolve(&args, &ctx).await)
            } else if let Some(value) = root_seed.as_ref().and_then(|seed| seed.get(&field.name)) {
                Source::Resolved(Ok(value.clone()))
            } else {
                Source::Mock
            };

            let path = vec![PathSegment::Field(key.to_owned())];
            let completed = completion.complete_field(root_type, field, def, source, &path);
            match try_nullify(&def.ty, completed) {
                Ok(value) => {
                    data.insert(key.to_owned(), value);
                }
                Err(PropagateNull) => {
                    return Ok(Response::partial(Value::Null, completion.errors));
                }
            }
        }

        Ok(Response::partial(Value::Object(data), completion.errors))
    }
}

/// Checks a selection against the schema, collecting every problem.
pub fn validate(
    schema: &TypeSystem,
    root_type: &str,
    selection: &[FieldSelection],
) -> Result<(), ExecutionError> {
    let mut errors = Vec::new();
    validate_selection(schema, root_type, selection, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ExecutionError::Validation(errors))
    }
}

fn validate_selection(
    schema: &TypeSystem,
    parent: &str,
    selection: &[FieldSelection],
    errors: &mut Vec<ValidationError>,
) {
    for field in selection {
        if field.name == "__typename" {
            if !field.selection.is_empty() {
                errors.push(ValidationError::LeafSelection {
                    field: field.name.clone(),
                    ty: "String!".into(),
                });
            }
            continue;
        }

        let Ok(def) = schema.field(parent, &field.name) else {
            errors.push(ValidationError::UnknownField {
                parent: parent.to_owned(),
                field: field.name.clone(),
            });
            continue;
        };

        for argument in field.arguments.keys() {
            if !def.arguments.contains_key(argument) {
                errors.push(ValidationError::UnknownArgument {
                    parent: parent.to_owned(),
                    field: field.name.clone(),
                    argument: argument.clone(),
                });
            }
        }
        for (name, argument) in &def.arguments {
            let provided = field.arguments.get(name).is_some_and(|value| !value.is_null());
            if argument.ty.is_non_null() && argument.default_value.is_none() && !provided {
                errors.push(ValidationError::MissingArgument {
                    parent: parent.to_owned(),
                    field: field.name.clone(),
                    argument: name.clone(),
                });
            }
        }

        match schema.resolve_type(def.ty.named_type()) {
            Ok(TypeDef::Object(object)) => {
                if field.selection.is_empty() {
                    errors.push(ValidationError::MissingSelection {
                        field: field.name.clone(),
                        ty: def.ty.to_string(),
                    });
                } else {
                    validate_selection(schema, &object.name, &field.selection, errors);
                }
            }
            Ok(_) if !field.selection.is_empty() => {
                errors.push(ValidationError::LeafSelection {
                    field: field.name.clone(),
                    ty: def.ty.to_string(),
                });
            }
            _ => {}
        }
    }
}

/// Where a field's value comes from.
enum Source {
    Mock,
    Resolved(ResolutionResult),
}

/// A field error is travelling up to the nearest nullable position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PropagateNull;

/// Absorbs a propagating null if `ty` is nullable.
fn try_nullify(ty: &TypeRef, result: Result<Value, PropagateNull>) -> Result<Value, PropagateNull> {
    match result {
        Ok(value) => Ok(value),
        Err(PropagateNull) if ty.is_non_null() => Err(PropagateNull),
        Err(PropagateNull) => Ok(Value::Null),
    }
}

fn child_path(path: &[PathSegment], segment: PathSegment) -> Vec<PathSegment> {
    let mut child = Vec::with_capacity(path.len() + 1);
    child.extend_from_slice(path);
    child.push(segment);
    child
}

/// Generates a mock value of type `ty` for the field at `at`, completing it
/// exactly as a request would.
///
/// Unlike a request, the first field error fails the whole value instead of
/// nulling a nullable position.
pub(crate) fn complete_mock(
    schema: &TypeSystem,
    mocks: &MockResolver,
    ty: &TypeRef,
    at: FieldPath<'_>,
    selection: &[FieldSelection],
) -> ResolutionResult {
    let resolved = match mocks.field_value(&at) {
        Some(result) => Some(result?),
        None => None,
    };
    let mut completion = Completion::new(schema, mocks);
    let result = completion.complete_value(ty, resolved, at, selection, &[]);
    if let Some(error) = completion.first_error {
        return Err(error);
    }
    result.map_err(|PropagateNull| {
        ResolutionError::Internal("null propagated without an error".into())
    })
}

struct Completion<'a> {
    schema: &'a TypeSystem,
    mocks: &'a MockResolver,
    errors: Vec<FieldError>,
    first_error: Option<ResolutionError>,
}

impl<'a> Completion<'a> {
    fn new(schema: &'a TypeSystem, mocks: &'a MockResolver) -> Self {
        Self {
            schema,
            mocks,
            errors: Vec::new(),
            first_error: None,
        }
    }

    fn field_error(&mut self, error: ResolutionError, path: &[PathSegment]) -> PropagateNull {
        self.errors
            .push(FieldError::from(error.clone()).with_path(path.to_vec()));
        self.first_error.get_or_insert(error);
        PropagateNull
    }

    fn complete_field(
        &mut self,
        parent_type: &str,
        field: &FieldSelection,
        def: &FieldDef,
        source: Source,
        path: &[PathSegment],
    ) -> Result<Value, PropagateNull> {
        let at = FieldPath::field(parent_type, &field.name);
        let source = match source {
            Source::Mock => match self.mocks.field_value(&at) {
                Some(result) => Source::Resolved(result),
                None => Source::Mock,
            },
            resolved => resolved,
        };
        let resolved = match source {
            Source::Mock => None,
            Source::Resolved(Ok(value)) => Some(value),
            Source::Resolved(Err(error)) => return Err(self.field_error(error, path)),
        };
        self.complete_value(&def.ty, resolved, at, &field.selection, path)
    }

    /// Completes `resolved` against `ty`. `None` means the value is mocked.
    fn complete_value(
        &mut self,
        ty: &TypeRef,
        resolved: Option<Value>,
        at: FieldPath<'_>,
        selection: &[FieldSelection],
        path: &[PathSegment],
    ) -> Result<Value, PropagateNull> {
        if let Some(Value::Null) = resolved {
            if ty.is_non_null() {
                return Err(self.non_null_violation(at, path));
            }
            return Ok(Value::Null);
        }

        match ty {
            TypeRef::NonNull(inner) => {
                let value = self.complete_value(inner, resolved, at, selection, path)?;
                if value.is_null() {
                    return Err(self.non_null_violation(at, path));
                }
                Ok(value)
            }
            TypeRef::List(inner) => {
                let items: Vec<Option<Value>> = match resolved {
                    Some(Value::Array(items)) => items.into_iter().map(Some).collect(),
                    Some(other) => {
                        let error = ResolutionError::invalid_value(ty.to_string(), &other);
                        return Err(self.field_error(error, path));
                    }
                    None => {
                        let len = self.mocks.list_len(&at, inner.named_type());
                        vec![None; len]
                    }
                };
                let mut completed = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let item_path = child_path(path, PathSegment::Index(index));
                    let result = self.complete_value(inner, item, at, selection, &item_path);
                    // A failed item nulls itself if it can, otherwise the list.
                    completed.push(try_nullify(inner, result)?);
                }
                Ok(Value::Array(completed))
            }
            TypeRef::Named(name) => {
                let def = match self.schema.resolve_type(name) {
                    Ok(def) => def,
                    Err(error) => {
                        let error = ResolutionError::Internal(error.to_string());
                        return Err(self.field_error(error, path));
                    }
                };
                match def {
                    TypeDef::Object(object) => {
                        let provided = match resolved {
                            Some(Value::Object(map)) => Some(map),
                            Some(other) => {
                                let error = ResolutionError::invalid_value(name.as_str(), &other);
                                return Err(self.field_error(error, path));
                            }
                            None => match self.mocks.object_seed(&at, name) {
                                Some(Ok(seed)) => Some(seed),
                                Some(Err(error)) => return Err(self.field_error(error, path)),
                                None => None,
                            },
                        };
                        self.complete_object(object, provided.as_ref(), selection, path)
                    }
                    leaf => {
                        let result = match resolved {
                            Some(value) => coerce_leaf(leaf, value),
                            None => self.mocks.leaf(&at, leaf),
                        };
                        result.map_err(|error| self.field_error(error, path))
                    }
                }
            }
        }
    }

    fn complete_object(
        &mut self,
        object: &ObjectDef,
        provided: Option<&Map<String, Value>>,
        selection: &[FieldSelection],
        path: &[PathSegment],
    ) -> Result<Value, PropagateNull> {
        let mut result = Map::new();
        for field in selection {
            let key = field.response_key();
            if field.name == "__typename" {
                result.insert(key.to_owned(), Value::String(object.name.clone()));
                continue;
            }
            let field_path = child_path(path, PathSegment::Field(key.to_owned()));
            let Some(def) = object.fields.get(&field.name) else {
                let error = ResolutionError::Internal(format!(
                    "unknown field {}.{}",
                    object.name, field.name
                ));
                return Err(self.field_error(error, &field_path));
            };
            // Keys absent from a provided object are mocked; an explicit null stays null.
            let source = match provided.and_then(|map| map.get(&field.name)) {
                Some(value) => Source::Resolved(Ok(value.clone())),
                None => Source::Mock,
            };
            let completed = self.complete_field(&object.name, field, def, source, &field_path);
            result.insert(key.to_owned(), try_nullify(&def.ty, completed)?);
        }
        Ok(Value::Object(result))
    }

    fn non_null_violation(&mut self, at: FieldPath<'_>, path: &[PathSegment]) -> PropagateNull {
        let field = match (at.parent_type, at.field_name) {
            (Some(parent), Some(field)) => format!("{parent}.{field}"),
            _ => "<root>".to_owned(),
        };
        self.field_error(ResolutionError::NullForNonNull(field), path)
    }
}

/// Checks a provided leaf value against its type.
fn coerce_leaf(def: &TypeDef, value: Value) -> ResolutionResult {
    let valid = match def {
        TypeDef::Enum(def) => value
            .as_str()
            .is_some_and(|symbol| def.values.iter().any(|v| v == symbol)),
        TypeDef::Scalar(scalar) => match scalar.name.as_str() {
            "Int" => value.as_i64().is_some_and(|int| i32::try_from(int).is_ok()),
            "Float" => value.is_number(),
            "String" => value.is_string(),
            "Boolean" => value.is_boolean(),
            "ID" => {
                if let Some(int) = value.as_i64() {
                    return Ok(Value::String(int.to_string()));
                }
                value.is_string()
            }
            // Custom scalars accept any value.
            _ => true,
        },
        TypeDef::Object(_) | TypeDef::InputObject(_) => false,
    };
    if valid {
        Ok(value)
    } else {
        Err(ResolutionError::invalid_value(def.name(), &value))
    }
}

/// An error in a response, with the path of the field it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// The error message.
    pub message: String,
    /// The path to the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    /// Error extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<IndexMap<String, Value>>,
}

/// A path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl FieldError {
    /// Creates a new field error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }

    /// Adds a path to the error.
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }

    /// Adds an extension.
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions
            .get_or_insert_with(IndexMap::new)
            .insert(key.into(), value);
        self
    }

    /// Sets the error code extension.
    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.with_extension("code", Value::String(code.into()))
    }

    /// The `extensions.code` value, if any.
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }
}

impl From<ResolutionError> for FieldError {
    fn from(error: ResolutionError) -> Self {
        FieldError::new(error.to_string())
    }
}

/// A GraphQL response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// The errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl Response {
    /// Creates a successful response with data.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// Creates an error response.
    pub fn error(error: FieldError) -> Self {
        Self {
            data: None,
            errors: Some(vec![error]),
        }
    }

    /// Creates an error response with multiple errors.
    pub fn errors(errors: Vec<FieldError>) -> Self {
        Self {
            data: None,
            errors: Some(errors),
        }
    }

    /// Creates a response with data and any field errors raised producing it.
    pub fn partial(data: Value, errors: Vec<FieldError>) -> Self {
        Self {
            data: Some(data),
            errors: (!errors.is_empty()).then_some(errors),
        }
    }

    /// Returns true if the response has errors.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }
}

impl From<ExecutionError> for Response {
    fn from(error: ExecutionError) -> Self {
        Self::errors(error.into_field_errors())
    }
}
