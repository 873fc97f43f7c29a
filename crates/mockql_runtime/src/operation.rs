//! Operation model.
//!
//! Client documents are validated by `apollo-compiler` against the loaded
//! schema and lowered into an [`Operation`]: fragments are flattened,
//! `@skip`/`@include` are applied and variables are substituted, so the
//! executor only ever sees a plain tree of field selections.

use crate::error::ValidationError;
use crate::schema::TypeSystem;
use apollo_compiler::ast::{self, OperationType};
use apollo_compiler::executable::{self, DirectiveList, Selection};
use apollo_compiler::ExecutableDocument;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The kind of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<OperationType> for OperationKind {
    fn from(ty: OperationType) -> Self {
        match ty {
            OperationType::Query => Self::Query,
            OperationType::Mutation => Self::Mutation,
            OperationType::Subscription => Self::Subscription,
        }
    }
}

/// A selected field with coerced arguments and its sub-selection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldSelection {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: IndexMap<String, Value>,
    pub selection: Vec<FieldSelection>,
}

impl FieldSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    pub fn select(mut self, field: FieldSelection) -> Self {
        self.selection.push(field);
        self
    }

    /// Key under which this field appears in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A parsed client operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub selection: Vec<FieldSelection>,
    pub variables: Map<String, Value>,
}

impl Operation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            name: None,
            selection: Vec::new(),
            variables: Map::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn select(mut self, field: FieldSelection) -> Self {
        self.selection.push(field);
        self
    }

    /// The first root selection. Subscriptions have exactly one.
    pub fn root_field(&self) -> Option<&FieldSelection> {
        self.selection.first()
    }

    /// Name of the root field, used as the subscription topic.
    pub fn root_field_name(&self) -> Option<&str> {
        self.root_field().map(|field| field.name.as_str())
    }
}

impl TypeSystem {
    /// Validates `text` against this schema and lowers the selected operation.
    pub fn parse_operation(
        &self,
        text: &str,
        operation_name: Option<&str>,
        variables: Option<Map<String, Value>>,
    ) -> Result<Operation, ValidationError> {
        let document =
            ExecutableDocument::parse_and_validate(self.compiled(), text, "operation.graphql")
                .map_err(|invalid| {
                    let messages: Vec<String> = invalid
                        .errors
                        .iter()
                        .map(|diagnostic| diagnostic.to_json().message)
                        .collect();
                    ValidationError::Document(messages.join("\n"))
                })?;

        let operation = document
            .operations
            .get(operation_name)
            .map_err(|_| match operation_name {
                Some(name) => ValidationError::UnknownOperation(name.to_owned()),
                None => ValidationError::Document(
                    "Must provide operation name if query contains multiple operations".into(),
                ),
            })?;

        let kind = OperationKind::from(operation.operation_type);
        if self.root_type(kind).is_none() {
            return Err(ValidationError::UnsupportedOperation(kind));
        }

        let variables = coerce_variables(&operation.variables, variables.unwrap_or_default())?;
        let lowering = Lowering {
            document: &document,
            variables: &variables,
        };
        let mut selection = Vec::new();
        lowering.lower_selection_set(&operation.selection_set, &mut selection);

        Ok(Operation {
            kind,
            name: operation.name.as_ref().map(|name| name.as_str().to_owned()),
            selection,
            variables,
        })
    }
}

/// Applies variable defaults and rejects missing required variables.
fn coerce_variables(
    definitions: &[apollo_compiler::Node<ast::VariableDefinition>],
    mut provided: Map<String, Value>,
) -> Result<Map<String, Value>, ValidationError> {
    for definition in definitions {
        let name = definition.name.as_str();
        let present = provided.get(name).is_some_and(|value| !value.is_null());
        if present {
            continue;
        }
        if let Some(default) = &definition.default_value {
            if !provided.contains_key(name) {
                provided.insert(name.to_owned(), const_to_json(default));
                continue;
            }
        }
        if definition.ty.is_non_null() {
            return Err(ValidationError::MissingVariable(name.to_owned()));
        }
    }
    Ok(provided)
}

struct Lowering<'a> {
    document: &'a ExecutableDocument,
    variables: &'a Map<String, Value>,
}

impl Lowering<'_> {
    fn lower_selection_set(&self, set: &executable::SelectionSet, out: &mut Vec<FieldSelection>) {
        for selection in &set.selections {
            match selection {
                Selection::Field(field) => {
                    if self.included(&field.directives) {
                        merge_field(out, self.lower_field(field));
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !self.included(&spread.directives) {
                        continue;
                    }
                    if let Some(fragment) = self.document.fragments.get(&spread.fragment_name) {
                        self.lower_selection_set(&fragment.selection_set, out);
                    }
                }
                Selection::InlineFragment(inline) => {
                    if self.included(&inline.directives) {
                        self.lower_selection_set(&inline.selection_set, out);
                    }
                }
            }
        }
    }

    fn lower_field(&self, field: &executable::Field) -> FieldSelection {
        let mut arguments = IndexMap::new();
        for argument in &field.arguments {
            if let Some(value) = value_to_json(&argument.value, self.variables) {
                arguments.insert(argument.name.as_str().to_owned(), value);
            }
        }
        for definition in &field.definition.arguments {
            if arguments.contains_key(definition.name.as_str()) {
                continue;
            }
            if let Some(default) = &definition.default_value {
                arguments.insert(definition.name.as_str().to_owned(), const_to_json(default));
            }
        }

        let mut selection = Vec::new();
        self.lower_selection_set(&field.selection_set, &mut selection);

        FieldSelection {
            name: field.name.as_str().to_owned(),
            alias: field.alias.as_ref().map(|alias| alias.as_str().to_owned()),
            arguments,
            selection,
        }
    }

    /// `@skip(if: true)` and `@include(if: false)` drop a selection.
    fn included(&self, directives: &DirectiveList) -> bool {
        let condition = |name: &str| {
            directives
                .get(name)
                .and_then(|directive| directive.specified_argument_by_name("if"))
                .and_then(|value| value_to_json(value, self.variables))
                .and_then(|value| value.as_bool())
        };
        condition("skip") != Some(true) && condition("include") != Some(false)
    }
}

/// Fields sharing a response key are merged into one selection.
fn merge_field(out: &mut Vec<FieldSelection>, field: FieldSelection) {
    match out
        .iter_mut()
        .find(|existing| existing.response_key() == field.response_key())
    {
        Some(existing) => {
            for child in field.selection {
                merge_field(&mut existing.selection, child);
            }
        }
        None => out.push(field),
    }
}

/// Converts a literal, substituting variables.
///
/// A top-level variable that was not provided yields `None` so the argument
/// is treated as absent. Nested unprovided variables become `null`.
pub(crate) fn value_to_json(value: &ast::Value, variables: &Map<String, Value>) -> Option<Value> {
    let converted = match value {
        ast::Value::Null => Value::Null,
        ast::Value::Variable(name) => return variables.get(name.as_str()).cloned(),
        ast::Value::Enum(name) => Value::String(name.as_str().to_owned()),
        ast::Value::String(text) => Value::String(text.as_str().to_owned()),
        ast::Value::Boolean(flag) => Value::Bool(*flag),
        ast::Value::Int(int) => match int.as_str().parse::<i64>() {
            Ok(int) => Value::from(int),
            Err(_) => int.try_to_f64().map_or(Value::Null, Value::from),
        },
        ast::Value::Float(float) => float.try_to_f64().map_or(Value::Null, Value::from),
        ast::Value::List(items) => Value::Array(
            items
                .iter()
                .map(|item| value_to_json(item, variables).unwrap_or(Value::Null))
                .collect(),
        ),
        ast::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, item)| {
                    let item = value_to_json(item, variables).unwrap_or(Value::Null);
                    (name.as_str().to_owned(), item)
                })
                .collect(),
        ),
    };
    Some(converted)
}

/// Converts a constant literal such as a default value.
pub(crate) fn const_to_json(value: &ast::Value) -> Value {
    value_to_json(value, &Map::new()).unwrap_or(Value::Null)
}
