//! Top-level document rendering.
//!
//! The [`Renderer`] orchestrates one render: pick the serializer, hand the
//! eager-load plan to the data-loading collaborator, serialize the primary
//! data, and collect the deduplicated `included` section. Document assembly
//! itself is [`build_document`], which enforces the wire contract (`data`
//! and `errors` are mutually exclusive, empty sections are omitted).

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::eager::EagerLoadPlanner;
use crate::error::RenderError;
use crate::include::IncludeTree;
use crate::included::IncludedSet;
use crate::model::{DataLoader, ModelGraph, SharedRecord};
use crate::resolver::Resolver;
use crate::serializer::{Registry, RenderContext, Serializer};
use crate::types::{Params, RenderConfig};

/// The pieces of a document, assembled by [`build_document`].
#[derive(Debug, Clone, Default)]
pub struct DocumentParts {
    pub data: Option<Value>,
    pub errors: Option<Vec<Value>>,
    pub included: Vec<Value>,
    pub meta: Option<Value>,
    pub links: Option<Value>,
}

/// Assemble a document from its parts.
///
/// Only supplied, non-empty sections appear: `included` and `links` are
/// dropped when empty, while `meta` appears whenever given, even empty.
///
/// # Errors
///
/// Returns `RenderError::DataWithErrors` when both `data` and `errors` are
/// supplied; the wire contract makes them mutually exclusive.
pub fn build_document(parts: DocumentParts) -> Result<Value, RenderError> {
    if parts.data.is_some() && parts.errors.is_some() {
        return Err(RenderError::DataWithErrors);
    }

    let mut doc = Map::new();
    if let Some(errors) = parts.errors {
        doc.insert("errors".to_string(), Value::Array(errors));
    } else if let Some(data) = parts.data {
        doc.insert("data".to_string(), data);
    }
    if !parts.included.is_empty() {
        doc.insert("included".to_string(), Value::Array(parts.included));
    }
    if let Some(links) = parts.links {
        if !section_is_empty(&links) {
            doc.insert("links".to_string(), links);
        }
    }
    if let Some(meta) = parts.meta {
        doc.insert("meta".to_string(), meta);
    }
    Ok(Value::Object(doc))
}

fn section_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Options for one render call.
#[derive(Clone, Default)]
pub struct RenderOptions {
    pub include: IncludeTree,
    pub params: Params,
    pub serializer: Option<Arc<Serializer>>,
    pub meta: Option<Value>,
    pub links: Option<Value>,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, include: IncludeTree) -> Self {
        self.include = include;
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Override serializer resolution for the root record(s).
    pub fn serializer(mut self, serializer: Arc<Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn links(mut self, links: Value) -> Self {
        self.links = Some(links);
        self
    }
}

/// A failure to map onto the error payload shape.
#[derive(Debug, Clone)]
pub enum Failure {
    /// The requested resource does not exist.
    NotFound,
    /// Validation failed; one entry per field violation.
    Invalid { violations: Vec<Violation> },
    /// Any other failure, carried as a bare message.
    Message(String),
}

/// One field-level validation violation.
#[derive(Debug, Clone)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Map a failure onto its error payload entries.
pub fn failure_objects(failure: &Failure, config: &RenderConfig) -> Vec<Value> {
    match failure {
        Failure::NotFound => {
            let mut entry = Map::new();
            entry.insert("status".to_string(), Value::from(404));
            entry.insert("title".to_string(), Value::from("Not Found"));
            entry.insert(
                "detail".to_string(),
                Value::from("The specified resource does not exist"),
            );
            vec![Value::Object(entry)]
        }
        Failure::Invalid { violations } => violations
            .iter()
            .map(|violation| {
                let mut source = Map::new();
                source.insert(
                    "pointer".to_string(),
                    Value::from(format!(
                        "/data/attributes/{}",
                        config.transform_key(&violation.field)
                    )),
                );
                let mut entry = Map::new();
                entry.insert("status".to_string(), Value::from(422));
                entry.insert("detail".to_string(), Value::from(violation.message.clone()));
                entry.insert("source".to_string(), Value::Object(source));
                Value::Object(entry)
            })
            .collect(),
        Failure::Message(message) => {
            let mut entry = Map::new();
            entry.insert("detail".to_string(), Value::from(message.clone()));
            vec![Value::Object(entry)]
        }
    }
}

/// Renders records into documents.
///
/// Holds the process-wide resolver and planner caches; construct one and
/// share it. Render calls for independent inputs are fully parallelizable.
pub struct Renderer {
    graph: Arc<ModelGraph>,
    resolver: Arc<Resolver>,
    planner: EagerLoadPlanner,
    config: RenderConfig,
    loader: Option<Arc<dyn DataLoader>>,
}

impl Renderer {
    pub fn new(registry: Arc<Registry>, graph: Arc<ModelGraph>) -> Self {
        let resolver = Arc::new(Resolver::new(registry, graph.clone()));
        let planner = EagerLoadPlanner::new(resolver.clone(), graph.clone());
        Self {
            graph,
            resolver,
            planner,
            config: RenderConfig::new(),
            loader: None,
        }
    }

    pub fn config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach the data-loading collaborator invoked before serialization.
    pub fn loader(mut self, loader: Arc<dyn DataLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn planner(&self) -> &EagerLoadPlanner {
        &self.planner
    }

    /// Render one record as a single-resource document.
    pub fn render_record(
        &self,
        record: &SharedRecord,
        opts: &RenderOptions,
    ) -> Result<Value, RenderError> {
        let serializer = match &opts.serializer {
            Some(serializer) => serializer.clone(),
            None => self.resolver.resolve_record(record.as_ref())?,
        };
        debug!(
            model = record.model_name(),
            type_tag = serializer.type_tag(),
            include = %opts.include.cache_key(),
            "rendering record"
        );
        self.eager_load(std::slice::from_ref(record), &opts.include, &serializer)?;

        let ctx = self.context(opts);
        let data = serializer.serialize(record.as_ref(), &opts.include, &ctx)?;

        let mut set = IncludedSet::new();
        if !opts.include.is_empty() {
            serializer.serialize_included(record.as_ref(), &opts.include, &ctx, &mut set)?;
        }

        build_document(DocumentParts {
            data: Some(data),
            errors: None,
            included: set.into_values(),
            meta: opts.meta.clone(),
            links: opts.links.clone(),
        })
    }

    /// Render a collection as a multi-resource document.
    ///
    /// One `IncludedSet` spans the whole collection, so a related record
    /// reachable from several roots is still serialized once; the loader is
    /// invoked once with the whole batch.
    pub fn render_records(
        &self,
        records: &[SharedRecord],
        opts: &RenderOptions,
    ) -> Result<Value, RenderError> {
        let batch_serializer = match &opts.serializer {
            Some(serializer) => Some(serializer.clone()),
            None => match records.first() {
                Some(first) => Some(self.resolver.resolve_record(first.as_ref())?),
                None => None,
            },
        };
        if let Some(serializer) = &batch_serializer {
            self.eager_load(records, &opts.include, serializer)?;
        }

        let ctx = self.context(opts);
        let mut data = Vec::with_capacity(records.len());
        let mut set = IncludedSet::new();
        for record in records {
            let serializer = match &opts.serializer {
                Some(serializer) => serializer.clone(),
                None => self.resolver.resolve_record(record.as_ref())?,
            };
            data.push(serializer.serialize(record.as_ref(), &opts.include, &ctx)?);
            if !opts.include.is_empty() {
                serializer.serialize_included(record.as_ref(), &opts.include, &ctx, &mut set)?;
            }
        }

        build_document(DocumentParts {
            data: Some(Value::Array(data)),
            errors: None,
            included: set.into_values(),
            meta: opts.meta.clone(),
            links: opts.links.clone(),
        })
    }

    /// Render a failure as an errors document.
    pub fn render_failure(&self, failure: &Failure) -> Value {
        let mut doc = Map::new();
        doc.insert(
            "errors".to_string(),
            Value::Array(failure_objects(failure, &self.config)),
        );
        Value::Object(doc)
    }

    fn context<'a>(&'a self, opts: &'a RenderOptions) -> RenderContext<'a> {
        RenderContext {
            resolver: &self.resolver,
            graph: &self.graph,
            config: &self.config,
            params: &opts.params,
        }
    }

    fn eager_load(
        &self,
        records: &[SharedRecord],
        include: &IncludeTree,
        serializer: &Arc<Serializer>,
    ) -> Result<(), RenderError> {
        let Some(loader) = &self.loader else {
            return Ok(());
        };
        let Some(first) = records.first() else {
            return Ok(());
        };
        let plan = self
            .planner
            .plan(first.model_name(), include, serializer)?;
        loader.load(records, &plan);
        Ok(())
    }
}
