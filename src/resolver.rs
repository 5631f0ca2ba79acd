//! Serializer resolution - maps values to serializer definitions.
//!
//! Resolution is polymorphic over what the caller has in hand: an
//! already-resolved definition, a symbolic type tag, a model name, a record,
//! or a homogeneous collection. Results are memoized for the process
//! lifetime; the mapping is stable once registration completes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::ResolveError;
use crate::model::{ModelGraph, Record, SharedRecord};
use crate::serializer::{Registry, Serializer};
use crate::types::Params;

/// A value resolvable to a serializer definition.
#[derive(Debug, Clone)]
pub enum ResolveTarget {
    /// Already resolved; returned as-is.
    Serializer(Arc<Serializer>),
    /// A symbolic type tag, e.g. `"user"`.
    Tag(String),
    /// A model name, e.g. `"User"`; resolution walks the model's parent
    /// chain on a miss.
    Model(String),
}

impl From<Arc<Serializer>> for ResolveTarget {
    fn from(serializer: Arc<Serializer>) -> Self {
        ResolveTarget::Serializer(serializer)
    }
}

impl From<&str> for ResolveTarget {
    /// A bare string is a type tag.
    fn from(tag: &str) -> Self {
        ResolveTarget::Tag(tag.to_string())
    }
}

/// Function choosing a serializer per record; evaluated at call time because
/// the choice cannot be made statically.
pub type DynamicSerializerFn =
    Arc<dyn Fn(&dyn Record, &Params) -> ResolveTarget + Send + Sync>;

/// Resolves serializer definitions from tags, models, and records, with a
/// process-wide memo cache.
///
/// The cache is read-mostly and populated lazily. Concurrent population of
/// the same key races harmlessly: recomputation yields an equal value.
pub struct Resolver {
    registry: Arc<Registry>,
    graph: Arc<ModelGraph>,
    cache: RwLock<HashMap<String, Arc<Serializer>>>,
}

impl Resolver {
    pub fn new(registry: Arc<Registry>, graph: Arc<ModelGraph>) -> Self {
        Self {
            registry,
            graph,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a target to its serializer definition.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::UnknownTag` for an unregistered tag, or
    /// `ResolveError::UnknownModel` when a model and its whole parent chain
    /// have no serializer.
    pub fn resolve(&self, target: &ResolveTarget) -> Result<Arc<Serializer>, ResolveError> {
        match target {
            ResolveTarget::Serializer(serializer) => Ok(serializer.clone()),
            ResolveTarget::Tag(tag) => self.resolve_tag(tag),
            ResolveTarget::Model(model) => self.resolve_model(model),
        }
    }

    /// Resolve the serializer for a record via its model name.
    pub fn resolve_record(&self, record: &dyn Record) -> Result<Arc<Serializer>, ResolveError> {
        self.resolve_model(record.model_name())
    }

    /// Resolve the serializer for a homogeneous collection via its first
    /// element.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::EmptyCollection` when there is no element to
    /// resolve from.
    pub fn resolve_records(
        &self,
        records: &[SharedRecord],
    ) -> Result<Arc<Serializer>, ResolveError> {
        let first = records.first().ok_or(ResolveError::EmptyCollection)?;
        self.resolve_record(first.as_ref())
    }

    /// Evaluate a per-record serializer function and resolve its result.
    pub fn resolve_dynamic(
        &self,
        f: &DynamicSerializerFn,
        record: &dyn Record,
        params: &Params,
    ) -> Result<Arc<Serializer>, ResolveError> {
        self.resolve(&f(record, params))
    }

    fn resolve_tag(&self, tag: &str) -> Result<Arc<Serializer>, ResolveError> {
        let key = format!("tag:{tag}");
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }
        let serializer = self
            .registry
            .by_tag(tag)
            .ok_or_else(|| ResolveError::UnknownTag {
                tag: tag.to_string(),
            })?;
        self.remember(key, &serializer);
        Ok(serializer)
    }

    fn resolve_model(&self, model: &str) -> Result<Arc<Serializer>, ResolveError> {
        let key = format!("model:{model}");
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        // Walk the model and its ancestors: explicit binding first, then the
        // convention-derived tag.
        let mut current = Some(model.to_string());
        while let Some(name) = current {
            let found = self
                .registry
                .by_model(&name)
                .or_else(|| self.registry.by_tag(&tag_for_model(&name)));
            if let Some(serializer) = found {
                self.remember(key, &serializer);
                return Ok(serializer);
            }
            current = self.graph.parent_of(&name).map(str::to_string);
        }

        Err(ResolveError::UnknownModel {
            model: model.to_string(),
        })
    }

    fn cached(&self, key: &str) -> Option<Arc<Serializer>> {
        self.cache
            .read()
            .ok()
            .and_then(|cache| cache.get(key).cloned())
    }

    fn remember(&self, key: String, serializer: &Arc<Serializer>) {
        if let Ok(mut cache) = self.cache.write() {
            debug!(key = %key, type_tag = serializer.type_tag(), "caching resolved serializer");
            cache.entry(key).or_insert_with(|| serializer.clone());
        }
    }
}

/// Convention-derived type tag for a model name: `"OrganizationUnit"` becomes
/// `"organization_unit"`.
pub fn tag_for_model(model: &str) -> String {
    let mut tag = String::with_capacity(model.len() + 4);
    for (i, c) in model.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                tag.push('_');
            }
            tag.extend(c.to_lowercase());
        } else {
            tag.push(c);
        }
    }
    tag
}
