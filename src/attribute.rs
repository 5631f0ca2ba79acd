//! Scalar output fields.

use serde_json::Value;

use crate::model::Record;
use crate::types::{Accessor, Computed, Params, Predicate};

/// One scalar output field: a name, an accessor, and an optional predicate
/// controlling whether the field appears at all.
#[derive(Debug, Clone)]
pub struct Attribute {
    name: String,
    accessor: Accessor,
    predicate: Option<Predicate>,
}

impl Attribute {
    /// Field read from the record under the same name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            accessor: Accessor::Field(name.clone()),
            name,
            predicate: None,
        }
    }

    /// Field computed by a function.
    pub fn computed(name: impl Into<String>, computed: Computed) -> Self {
        Self {
            name: name.into(),
            accessor: Accessor::Computed(computed),
            predicate: None,
        }
    }

    /// Read the field from a differently-named record attribute.
    pub fn from_field(mut self, field: impl Into<String>) -> Self {
        self.accessor = Accessor::Field(field.into());
        self
    }

    /// Serialize this field only when the predicate holds.
    pub fn only_if(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self, record: &dyn Record, params: &Params) -> Value {
        self.accessor.read(record, params)
    }

    pub fn enabled(&self, record: &dyn Record, params: &Params) -> bool {
        match &self.predicate {
            Some(predicate) => predicate.call(record, params),
            None => true,
        }
    }
}
