//! Closed registry of named specifier and edge-property functions.
//!
//! Schemas reference functions by name. Every name is resolved against this
//! registry when the schema is validated, so an unknown name fails before any
//! record is processed.

use std::collections::HashMap;
use std::sync::Arc;

use graphmill_core::{
    Error, ExtractedRecord, FunctionCatalog, Result, SchemaEntry, VertexData,
};
use serde_json::Value as JsonValue;

/// Everything a function may look at.
pub struct FunctionContext<'a> {
    pub source_vertex: &'a VertexData,
    /// The other endpoint. `None` while the candidate itself is being specified.
    pub target_vertex: Option<&'a VertexData>,
    pub record: &'a ExtractedRecord,
    /// Entry being built: the candidate's vertex entry or the edge entry.
    pub entry: SchemaEntry<'a>,
    pub inbound: bool,
}

/// A pure function producing one raw property value.
///
/// Returning `Ok(None)` means "no value", which the caller treats like an
/// absent key.
pub trait PropertyFunction: Send + Sync {
    fn call(&self, ctx: &FunctionContext<'_>) -> Result<Option<JsonValue>>;
}

impl<F> PropertyFunction for F
where
    F: Fn(&FunctionContext<'_>) -> Result<Option<JsonValue>> + Send + Sync,
{
    fn call(&self, ctx: &FunctionContext<'_>) -> Result<Option<JsonValue>> {
        self(ctx)
    }
}

/// Registry mapping function names to implementations.
#[derive(Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn PropertyFunction>>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in functions:
    ///
    /// | Name | Value |
    /// |------|-------|
    /// | `source_internal_id` | internal id of the source vertex |
    /// | `source_id_value` | id value of the source vertex |
    /// | `target_internal_id` | internal id of the other endpoint, if known |
    /// | `record_id_value` | `id_value` of the incoming record |
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_fn("source_internal_id", |ctx: &FunctionContext<'_>| {
            Ok(ctx
                .source_vertex
                .internal_id
                .as_derived()
                .map(|id| JsonValue::String(id.to_string())))
        });
        registry.register_fn("source_id_value", |ctx: &FunctionContext<'_>| {
            Ok(ctx.source_vertex.id_value.as_value().map(|v| v.to_json()))
        });
        registry.register_fn("target_internal_id", |ctx: &FunctionContext<'_>| {
            Ok(ctx
                .target_vertex
                .and_then(|t| t.internal_id.as_derived())
                .map(|id| JsonValue::String(id.to_string())))
        });
        registry.register_fn("record_id_value", |ctx: &FunctionContext<'_>| {
            Ok(Some(ctx.record.id_value.clone()))
        });
        registry
    }

    /// Register a function. Replaces any existing function with the same name.
    pub fn register(&mut self, name: impl Into<String>, function: Arc<dyn PropertyFunction>) {
        self.functions.insert(name.into(), function);
    }

    /// Register a closure.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&FunctionContext<'_>) -> Result<Option<JsonValue>> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn PropertyFunction>> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownSpecifierFunction(name.to_string()))
    }

    /// Look up and invoke a function.
    pub fn call(&self, name: &str, ctx: &FunctionContext<'_>) -> Result<Option<JsonValue>> {
        self.get(name)?.call(ctx)
    }

    /// Names of all registered functions, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionCatalog for FunctionRegistry {
    fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}
