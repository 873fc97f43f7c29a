//! Type system model for mockql.
//!
//! Schema text is parsed and validated by `apollo-compiler`, then lowered into
//! the [`TypeSystem`] below. The model is immutable once built; reloading
//! goes through [`SchemaHandle::swap`], which replaces the whole structure.

use crate::error::{SchemaError, SchemaResult};
use crate::operation::{const_to_json, OperationKind};
use apollo_compiler::ast::{self, OperationType};
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Names of the scalars every schema has.
pub const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// A loaded, validated schema.
#[derive(Debug, Clone)]
pub struct TypeSystem {
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    types: IndexMap<String, TypeDef>,
    compiled: Valid<apollo_compiler::Schema>,
}

impl TypeSystem {
    /// Parses and validates schema SDL.
    pub fn parse(sdl: &str) -> SchemaResult<Self> {
        let compiled = apollo_compiler::Schema::parse_and_validate(sdl, "schema.graphql")
            .map_err(|invalid| SchemaError::Invalid(invalid.errors.to_string()))?;
        Self::from_compiled(compiled)
    }

    fn from_compiled(compiled: Valid<apollo_compiler::Schema>) -> SchemaResult<Self> {
        let mut types = IndexMap::new();

        for (name, extended) in &compiled.types {
            if name.as_str().starts_with("__") {
                continue;
            }
            let def = match extended {
                ExtendedType::Scalar(scalar) => TypeDef::Scalar(ScalarDef {
                    name: name.as_str().to_owned(),
                    description: describe(scalar.description.as_ref()),
                    built_in: BUILTIN_SCALARS.contains(&name.as_str()),
                }),
                ExtendedType::Enum(enum_ty) => TypeDef::Enum(EnumDef {
                    name: name.as_str().to_owned(),
                    description: describe(enum_ty.description.as_ref()),
                    values: enum_ty
                        .values
                        .keys()
                        .map(|value| value.as_str().to_owned())
                        .collect(),
                }),
                ExtendedType::Object(object) => {
                    let fields = object
                        .fields
                        .iter()
                        .map(|(field_name, field)| {
                            let arguments = field
                                .arguments
                                .iter()
                                .map(|arg| (arg.name.as_str().to_owned(), lower_input_value(arg)))
                                .collect();
                            let def = FieldDef {
                                name: field_name.as_str().to_owned(),
                                description: describe(field.description.as_ref()),
                                ty: lower_type(&field.ty),
                                arguments,
                            };
                            (field_name.as_str().to_owned(), def)
                        })
                        .collect();
                    TypeDef::Object(ObjectDef {
                        name: name.as_str().to_owned(),
                        description: describe(object.description.as_ref()),
                        fields,
                    })
                }
                ExtendedType::InputObject(input) => TypeDef::InputObject(InputObjectDef {
                    name: name.as_str().to_owned(),
                    description: describe(input.description.as_ref()),
                    fields: input
                        .fields
                        .iter()
                        .map(|(field_name, field)| {
                            (field_name.as_str().to_owned(), lower_input_value(field))
                        })
                        .collect(),
                }),
                ExtendedType::Interface(_) => {
                    return Err(SchemaError::UnsupportedType {
                        name: name.as_str().to_owned(),
                        kind: "interface",
                    })
                }
                ExtendedType::Union(_) => {
                    return Err(SchemaError::UnsupportedType {
                        name: name.as_str().to_owned(),
                        kind: "union",
                    })
                }
            };
            types.insert(name.as_str().to_owned(), def);
        }

        let root = |operation_type| {
            compiled
                .root_operation(operation_type)
                .map(|name| name.as_str().to_owned())
        };
        let query_type =
            root(OperationType::Query).ok_or(SchemaError::MissingRoot(OperationKind::Query))?;
        let mutation_type = root(OperationType::Mutation);
        let subscription_type = root(OperationType::Subscription);

        let system = Self {
            query_type,
            mutation_type,
            subscription_type,
            types,
            compiled,
        };
        system.check_references()?;
        Ok(system)
    }

    /// Every field and argument must reference a declared type.
    fn check_references(&self) -> SchemaResult<()> {
        for def in self.types.values() {
            match def {
                TypeDef::Object(object) => {
                    for field in object.fields.values() {
                        self.resolve_type(field.ty.named_type())?;
                        for arg in field.arguments.values() {
                            self.resolve_type(arg.ty.named_type())?;
                        }
                    }
                }
                TypeDef::InputObject(input) => {
                    for field in input.fields.values() {
                        self.resolve_type(field.ty.named_type())?;
                    }
                }
                TypeDef::Scalar(_) | TypeDef::Enum(_) => {}
            }
        }
        for root in [&self.mutation_type, &self.subscription_type]
            .into_iter()
            .flatten()
            .chain(std::iter::once(&self.query_type))
        {
            self.fields_of(root)?;
        }
        Ok(())
    }

    /// Looks up a named type.
    pub fn resolve_type(&self, name: &str) -> SchemaResult<&TypeDef> {
        self.types
            .get(name)
            .ok_or_else(|| SchemaError::UnknownType(name.to_owned()))
    }

    /// Returns the fields of an object type.
    pub fn fields_of(&self, object: &str) -> SchemaResult<&IndexMap<String, FieldDef>> {
        match self.resolve_type(object)? {
            TypeDef::Object(def) => Ok(&def.fields),
            _ => Err(SchemaError::NotAnObject(object.to_owned())),
        }
    }

    /// Looks up one field of an object type.
    pub fn field(&self, object: &str, field: &str) -> SchemaResult<&FieldDef> {
        self.fields_of(object)?
            .get(field)
            .ok_or_else(|| SchemaError::UnknownField {
                parent: object.to_owned(),
                field: field.to_owned(),
            })
    }

    /// Root type name for an operation kind, if the schema declares one.
    pub fn root_type(&self, kind: OperationKind) -> Option<&str> {
        match kind {
            OperationKind::Query => Some(self.query_type.as_str()),
            OperationKind::Mutation => self.mutation_type.as_deref(),
            OperationKind::Subscription => self.subscription_type.as_deref(),
        }
    }

    /// Returns all named types in declaration order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    pub(crate) fn compiled(&self) -> &Valid<apollo_compiler::Schema> {
        &self.compiled
    }
}

fn describe(description: Option<&apollo_compiler::Node<str>>) -> Option<String> {
    description.map(|text| String::from(&**text))
}

fn lower_input_value(value: &ast::InputValueDefinition) -> InputValueDef {
    InputValueDef {
        name: value.name.as_str().to_owned(),
        description: describe(value.description.as_ref()),
        ty: lower_type(&value.ty),
        default_value: value.default_value.as_ref().map(|v| const_to_json(v)),
    }
}

fn lower_type(ty: &ast::Type) -> TypeRef {
    match ty {
        ast::Type::Named(name) => TypeRef::named(name.as_str()),
        ast::Type::NonNullNamed(name) => TypeRef::non_null(TypeRef::named(name.as_str())),
        ast::Type::List(inner) => TypeRef::list(lower_type(inner)),
        ast::Type::NonNullList(inner) => TypeRef::non_null(TypeRef::list(lower_type(inner))),
    }
}

/// A named type definition.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDef {
    Scalar(ScalarDef),
    Enum(EnumDef),
    Object(ObjectDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(def) => &def.name,
            Self::Enum(def) => &def.name,
            Self::Object(def) => &def.name,
            Self::InputObject(def) => &def.name,
        }
    }

    /// Scalars and enums have no subfields.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_))
    }
}

/// Scalar type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarDef {
    pub name: String,
    pub description: Option<String>,
    pub built_in: bool,
}

/// Enum type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<String>,
}

/// Object type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
}

/// Input object type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct InputObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputValueDef>,
}

/// Field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputValueDef>,
}

/// Argument or input field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct InputValueDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub default_value: Option<serde_json::Value>,
}

/// Type reference with list and non-null modifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    /// Wraps `inner` as non-null. Wrapping an already non-null type is a no-op.
    pub fn non_null(inner: TypeRef) -> Self {
        match inner {
            Self::NonNull(_) => inner,
            other => Self::NonNull(Box::new(other)),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }

    /// The innermost named type.
    pub fn named_type(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.named_type(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// Shared, swappable reference to the current schema.
///
/// Readers take an `Arc` snapshot and keep a consistent view for as long as
/// they hold it, even if a reload swaps in a new schema meanwhile.
#[derive(Debug)]
pub struct SchemaHandle {
    current: RwLock<Arc<TypeSystem>>,
}

impl SchemaHandle {
    pub fn new(schema: TypeSystem) -> Self {
        Self {
            current: RwLock::new(Arc::new(schema)),
        }
    }

    /// Snapshot of the current schema.
    pub fn current(&self) -> Arc<TypeSystem> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the whole schema, returning the previous one.
    pub fn swap(&self, next: TypeSystem) -> Arc<TypeSystem> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(next))
    }
}
