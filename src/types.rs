//! Core types shared across serialization: accessors, predicates, and render configuration.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::model::Record;

/// Caller-supplied parameters threaded through every accessor and predicate.
pub type Params = serde_json::Map<String, Value>;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A computed value function, tagged by the arguments it accepts.
///
/// Mapping authors declare the arity up front; dispatch matches the tag
/// rather than inspecting anything at runtime.
#[derive(Clone)]
pub enum Computed {
    Zero(Arc<dyn Fn() -> Value + Send + Sync>),
    One(Arc<dyn Fn(&dyn Record) -> Value + Send + Sync>),
    Two(Arc<dyn Fn(&dyn Record, &Params) -> Value + Send + Sync>),
}

impl Computed {
    pub fn call(&self, record: &dyn Record, params: &Params) -> Value {
        match self {
            Computed::Zero(f) => f(),
            Computed::One(f) => f(record),
            Computed::Two(f) => f(record, params),
        }
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arity = match self {
            Computed::Zero(_) => 0,
            Computed::One(_) => 1,
            Computed::Two(_) => 2,
        };
        write!(f, "Computed(arity {arity})")
    }
}

/// A predicate controlling whether a field is serialized, tagged by arity.
#[derive(Clone)]
pub enum Predicate {
    Zero(Arc<dyn Fn() -> bool + Send + Sync>),
    One(Arc<dyn Fn(&dyn Record) -> bool + Send + Sync>),
    Two(Arc<dyn Fn(&dyn Record, &Params) -> bool + Send + Sync>),
}

impl Predicate {
    pub fn call(&self, record: &dyn Record, params: &Params) -> bool {
        match self {
            Predicate::Zero(f) => f(),
            Predicate::One(f) => f(record),
            Predicate::Two(f) => f(record, params),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arity = match self {
            Predicate::Zero(_) => 0,
            Predicate::One(_) => 1,
            Predicate::Two(_) => 2,
        };
        write!(f, "Predicate(arity {arity})")
    }
}

/// How a scalar output field reads its value from a record.
#[derive(Debug, Clone)]
pub enum Accessor {
    /// Read the field of the same-named record attribute.
    Field(String),
    /// Invoke a computed function.
    Computed(Computed),
}

impl Accessor {
    pub fn read(&self, record: &dyn Record, params: &Params) -> Value {
        match self {
            Accessor::Field(field) => record.get(field),
            Accessor::Computed(f) => f.call(record, params),
        }
    }
}

/// Transform applied to every output attribute and relationship key.
pub type KeyTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Transform applied to every emitted identifier.
pub type IdTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Render configuration: key and id transform hooks.
///
/// Both default to identity. Transforms are pure functions applied on
/// output only; they never affect record access or serializer resolution.
#[derive(Clone, Default)]
pub struct RenderConfig {
    key_transform: Option<KeyTransform>,
    id_transform: Option<IdTransform>,
}

impl RenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key transform (e.g. camelCase output keys).
    pub fn key_transform(
        mut self,
        transform: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.key_transform = Some(Arc::new(transform));
        self
    }

    /// Set the id transform (e.g. stringify numeric ids).
    pub fn id_transform(mut self, transform: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.id_transform = Some(Arc::new(transform));
        self
    }

    pub fn transform_key(&self, key: &str) -> String {
        match &self.key_transform {
            Some(f) => f(key),
            None => key.to_string(),
        }
    }

    pub fn transform_id(&self, id: Value) -> Value {
        match &self.id_transform {
            Some(f) => f(id),
            None => id,
        }
    }
}

impl fmt::Debug for RenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderConfig")
            .field("key_transform", &self.key_transform.is_some())
            .field("id_transform", &self.id_transform.is_some())
            .finish()
    }
}
