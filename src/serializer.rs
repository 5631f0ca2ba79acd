//! Serializer definitions: the declarative per-type mapping of attributes,
//! relationships, identity, and type tag.
//!
//! Definitions are built once through [`SerializerBuilder`], registered in a
//! [`Registry`], and treated as immutable for the rest of the process. A
//! child definition can extend a parent: the parent's field maps are copied
//! at build time, so there is no chain walking during serialization.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::attribute::Attribute;
use crate::error::RenderError;
use crate::include::IncludeTree;
use crate::included::IncludedSet;
use crate::model::{ModelGraph, Record};
use crate::relationship::Relationship;
use crate::resolver::Resolver;
use crate::types::{Accessor, Computed, Params, Predicate, RenderConfig};

/// Everything a serialization walk needs besides the record itself.
pub struct RenderContext<'a> {
    pub resolver: &'a Resolver,
    pub graph: &'a ModelGraph,
    pub config: &'a RenderConfig,
    pub params: &'a Params,
}

/// A declarative mapping from one record type to its JSON:API resource
/// shape. Immutable once built; shared as `Arc`.
pub struct Serializer {
    type_tag: String,
    id: Option<Accessor>,
    attributes: IndexMap<String, Attribute>,
    relationships: IndexMap<String, Relationship>,
}

impl Serializer {
    pub fn builder(type_tag: impl Into<String>) -> SerializerBuilder {
        SerializerBuilder::new(type_tag)
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn relationships(&self) -> impl Iterator<Item = (&str, &Relationship)> {
        self.relationships.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }

    /// The record's identity as this definition sees it: the configured id
    /// accessor, or the record's primary identity.
    pub fn id_for(&self, record: &dyn Record, params: &Params) -> Value {
        match &self.id {
            Some(accessor) => accessor.read(record, params),
            None => record.id(),
        }
    }

    /// Serialize the record's primary fields into a resource object:
    /// `{type, id, attributes?, relationships?}`.
    ///
    /// `include` drives the per-relationship included flag; relationships
    /// named there emit data references even where they otherwise would not.
    /// Empty attribute/relationship maps are omitted.
    pub fn serialize(
        &self,
        record: &dyn Record,
        include: &IncludeTree,
        ctx: &RenderContext<'_>,
    ) -> Result<Value, RenderError> {
        let mut out = Map::new();
        out.insert("type".to_string(), Value::String(self.type_tag.clone()));
        out.insert(
            "id".to_string(),
            ctx.config.transform_id(self.id_for(record, ctx.params)),
        );

        let mut attributes = Map::new();
        for attribute in self.attributes.values() {
            if attribute.enabled(record, ctx.params) {
                attributes.insert(
                    ctx.config.transform_key(attribute.name()),
                    attribute.value(record, ctx.params),
                );
            }
        }
        if !attributes.is_empty() {
            out.insert("attributes".to_string(), Value::Object(attributes));
        }

        let mut relationships = Map::new();
        for (name, relationship) in &self.relationships {
            let included = include.contains(name);
            if !relationship.enabled(record, ctx.params, included) {
                continue;
            }
            if let Some(value) = relationship.serialize(record, ctx, included)? {
                relationships.insert(ctx.config.transform_key(name), value);
            }
        }
        if !relationships.is_empty() {
            out.insert("relationships".to_string(), Value::Object(relationships));
        }

        Ok(Value::Object(out))
    }

    /// Walk the include tree, serializing related records into `set`.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::UnknownRelationship` when the tree names a
    /// relationship this definition does not have.
    pub fn serialize_included(
        &self,
        record: &dyn Record,
        include: &IncludeTree,
        ctx: &RenderContext<'_>,
        set: &mut IncludedSet,
    ) -> Result<(), RenderError> {
        for (name, children) in include.iter() {
            let relationship =
                self.relationship(name)
                    .ok_or_else(|| RenderError::UnknownRelationship {
                        name: name.to_string(),
                        type_tag: self.type_tag.clone(),
                    })?;
            if relationship.enabled_for_included(record, ctx.params) {
                relationship.serialize_included(record, children, ctx, set)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("type_tag", &self.type_tag)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("relationships", &self.relationships.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`Serializer`]. Later entries override earlier ones of the
/// same name, which is how a child definition replaces inherited fields.
pub struct SerializerBuilder {
    type_tag: String,
    id: Option<Accessor>,
    attributes: IndexMap<String, Attribute>,
    relationships: IndexMap<String, Relationship>,
}

impl SerializerBuilder {
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            id: None,
            attributes: IndexMap::new(),
            relationships: IndexMap::new(),
        }
    }

    /// Start from a parent definition's field maps. The copies are owned by
    /// this builder; the parent stays untouched.
    pub fn extending(type_tag: impl Into<String>, parent: &Serializer) -> Self {
        Self {
            type_tag: type_tag.into(),
            id: parent.id.clone(),
            attributes: parent.attributes.clone(),
            relationships: parent.relationships.clone(),
        }
    }

    /// Identity read from a record field instead of the primary identity.
    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id = Some(Accessor::Field(field.into()));
        self
    }

    /// Identity computed by a function.
    pub fn id_with(mut self, computed: Computed) -> Self {
        self.id = Some(Accessor::Computed(computed));
        self
    }

    /// Attribute read from the same-named record field.
    pub fn attribute(self, name: impl Into<String>) -> Self {
        self.attribute_with(Attribute::new(name))
    }

    /// Several same-named attributes at once.
    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self = self.attribute(name);
        }
        self
    }

    /// Attribute computed by a function.
    pub fn computed_attribute(self, name: impl Into<String>, computed: Computed) -> Self {
        self.attribute_with(Attribute::computed(name, computed))
    }

    /// Conditionally serialized attribute.
    pub fn attribute_if(self, name: impl Into<String>, predicate: Predicate) -> Self {
        self.attribute_with(Attribute::new(name).only_if(predicate))
    }

    /// Fully configured attribute.
    pub fn attribute_with(mut self, attribute: Attribute) -> Self {
        self.attributes.insert(attribute.name().to_string(), attribute);
        self
    }

    /// Fully configured relationship.
    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships
            .insert(relationship.name().to_string(), relationship);
        self
    }

    pub fn build(self) -> Arc<Serializer> {
        Arc::new(Serializer {
            type_tag: self.type_tag,
            id: self.id,
            attributes: self.attributes,
            relationships: self.relationships,
        })
    }
}

/// Registry of serializer definitions.
///
/// Populated once before rendering begins; read-only and lock-free
/// thereafter. A definition is registered under its type tag; a model may
/// additionally be bound explicitly where the convention-derived tag does
/// not apply.
#[derive(Debug, Default)]
pub struct Registry {
    by_tag: HashMap<String, Arc<Serializer>>,
    by_model: HashMap<String, Arc<Serializer>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, serializer: Arc<Serializer>) {
        self.by_tag
            .insert(serializer.type_tag().to_string(), serializer);
    }

    /// Bind a model name directly to a definition, bypassing the
    /// convention-derived tag.
    pub fn register_for_model(&mut self, model: impl Into<String>, serializer: Arc<Serializer>) {
        self.by_model.insert(model.into(), serializer);
    }

    pub fn by_tag(&self, tag: &str) -> Option<Arc<Serializer>> {
        self.by_tag.get(tag).cloned()
    }

    pub fn by_model(&self, model: &str) -> Option<Arc<Serializer>> {
        self.by_model.get(model).cloned()
    }
}
