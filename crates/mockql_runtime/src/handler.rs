//! Field handlers.
//!
//! A handler computes the value of a root field instead of the mock resolver.
//! Mutations with side effects are served this way; the handler's result is
//! then completed against the selection like any other value.

use crate::error::{ResolutionError, ResolutionResult};
use crate::operation::{Operation, OperationKind};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Arguments passed to a handler.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    args: IndexMap<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(args: IndexMap<String, Value>) -> Self {
        Self { args }
    }

    /// Gets an argument by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Gets an argument as a specific type.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.args
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a required argument, returning an error if not found.
    pub fn require<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, ResolutionError> {
        let value = self
            .args
            .get(name)
            .ok_or_else(|| ResolutionError::MissingArgument(name.to_string()))?;
        serde_json::from_value(value.clone())
            .map_err(|e| ResolutionError::ArgumentParse(name.to_string(), e.to_string()))
    }

    pub fn all(&self) -> &IndexMap<String, Value> {
        &self.args
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), value);
    }
}

/// Per-operation context handed to handlers.
#[derive(Debug, Clone)]
pub struct Context {
    pub kind: OperationKind,
    pub operation_name: Option<String>,
    pub variables: Map<String, Value>,
}

impl Context {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            operation_name: None,
            variables: Map::new(),
        }
    }

    pub fn for_operation(operation: &Operation) -> Self {
        Self {
            kind: operation.kind,
            operation_name: operation.name.clone(),
            variables: operation.variables.clone(),
        }
    }
}

/// Future type for handlers.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ResolutionResult> + Send + 'a>>;

/// Computes the value of one root field.
pub trait FieldHandler: Send + Sync {
    fn resolve<'a>(&'a self, args: &'a Arguments, ctx: &'a Context) -> HandlerFuture<'a>;
}

/// A sync handler function.
pub type SyncHandlerFn = Arc<dyn Fn(&Arguments, &Context) -> ResolutionResult + Send + Sync>;

/// Adapts a sync closure.
pub struct FnHandler {
    func: SyncHandlerFn,
}

impl FnHandler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Arguments, &Context) -> ResolutionResult + Send + Sync + 'static,
    {
        Self { func: Arc::new(f) }
    }
}

impl FieldHandler for FnHandler {
    fn resolve<'a>(&'a self, args: &'a Arguments, ctx: &'a Context) -> HandlerFuture<'a> {
        let result = (self.func)(args, ctx);
        Box::pin(async move { result })
    }
}

/// An async handler function.
pub type AsyncHandlerFn =
    Arc<dyn Fn(Arguments, Context) -> HandlerFuture<'static> + Send + Sync>;

/// Adapts an async closure. Arguments and context are cloned into the future.
pub struct AsyncFnHandler {
    func: AsyncHandlerFn,
}

impl AsyncFnHandler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Arguments, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolutionResult> + Send + 'static,
    {
        Self {
            func: Arc::new(move |args: Arguments, ctx: Context| -> HandlerFuture<'static> {
                Box::pin(f(args, ctx))
            }),
        }
    }
}

impl FieldHandler for AsyncFnHandler {
    fn resolve<'a>(&'a self, args: &'a Arguments, ctx: &'a Context) -> HandlerFuture<'a> {
        (self.func)(args.clone(), ctx.clone())
    }
}

/// Handlers indexed by "TypeName.fieldName".
#[derive(Default)]
pub struct HandlerMap {
    handlers: IndexMap<String, Box<dyn FieldHandler>>,
}

impl HandlerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a specific type and field.
    pub fn register<H: FieldHandler + 'static>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        handler: H,
    ) {
        let key = format!("{}.{}", type_name.into(), field_name.into());
        self.handlers.insert(key, Box::new(handler));
    }

    /// Registers a sync function as a handler.
    pub fn register_fn<F>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) where
        F: Fn(&Arguments, &Context) -> ResolutionResult + Send + Sync + 'static,
    {
        self.register(type_name, field_name, FnHandler::new(f));
    }

    /// Registers an async function as a handler.
    pub fn register_async<F, Fut>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) where
        F: Fn(Arguments, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolutionResult> + Send + 'static,
    {
        self.register(type_name, field_name, AsyncFnHandler::new(f));
    }

    pub fn get(&self, type_name: &str, field_name: &str) -> Option<&dyn FieldHandler> {
        let key = format!("{}.{}", type_name, field_name);
        self.handlers.get(&key).map(|h| h.as_ref())
    }

    pub fn contains(&self, type_name: &str, field_name: &str) -> bool {
        self.get(type_name, field_name).is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Debug for HandlerMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerMap")
            .field("fields", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
