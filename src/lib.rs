//! JSON:API document rendering.
//!
//! Serializes domain records into JSON:API documents from declarative
//! per-type definitions: which attributes a type exposes, how its
//! relationships emit references or links, and how related records are
//! collected into the deduplicated `included` section.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use jsonapi_render::{
//!     Association, IncludeTree, MemoryStore, ModelGraph, ModelType, Registry,
//!     Relationship, Renderer, RenderOptions, SerializerBuilder,
//! };
//! use serde_json::json;
//!
//! let mut graph = ModelGraph::new();
//! graph.register(
//!     ModelType::new("User").association(
//!         "organization",
//!         Association::belongs_to("organization_id", "Organization"),
//!     ),
//! );
//! graph.register(ModelType::new("Organization"));
//! let graph = Arc::new(graph);
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     SerializerBuilder::new("user")
//!         .attribute("name")
//!         .relationship(Relationship::belongs_to("organization"))
//!         .build(),
//! );
//! registry.register(SerializerBuilder::new("organization").attribute("name").build());
//!
//! let store = MemoryStore::new(graph.clone());
//! store.insert("Organization", json!({ "id": 7, "name": "Springfield Power" }));
//! let user = store.insert("User", json!({ "id": 1, "name": "Homer", "organization_id": 7 }));
//!
//! let renderer = Renderer::new(Arc::new(registry), graph);
//! let doc = renderer
//!     .render_record(&user, &RenderOptions::new().include(IncludeTree::from("organization")))
//!     .unwrap();
//!
//! assert_eq!(doc["data"]["attributes"]["name"], json!("Homer"));
//! assert_eq!(doc["included"][0]["attributes"]["name"], json!("Springfield Power"));
//! ```
//!
//! # Relationship behavior
//!
//! | Variant | Reference source | Default output |
//! |--------------|---------------------------------|------------------------------|
//! | `belongs_to` | foreign key on the record | data reference, no fetch |
//! | `has_one` | fetched related record | data reference |
//! | `has_many` | fetched related collection | suppressed unless included, |
//! | | | forced, or linked |
//!
//! A configured link replaces the data reference on to-one relationships
//! unless `force_data` applies; an included relationship always emits data.

mod attribute;
mod document;
mod eager;
mod error;
mod include;
mod included;
mod manifest;
mod model;
mod relationship;
mod resolver;
mod serializer;
mod store;
mod types;

pub use attribute::Attribute;
pub use document::{
    build_document, failure_objects, DocumentParts, Failure, RenderOptions, Renderer, Violation,
};
pub use eager::{EagerLoadPlan, EagerLoadPlanner};
pub use error::{IncludeError, ManifestError, RenderError, ResolveError};
pub use include::IncludeTree;
pub use included::IncludedSet;
pub use manifest::{
    AssociationDef, AttributeDef, KindDef, Manifest, ModelDef, RelationshipDef, SerializerDef,
    World,
};
pub use model::{
    Association, AssociationKind, DataLoader, ModelGraph, ModelType, NoopLoader, Record,
    RelatedTarget, SharedRecord,
};
pub use relationship::{
    ForceData, Link, RelatedAccessor, RelatedManyFn, RelatedOneFn, Relationship, RelationshipKind,
    SerializerRef,
};
pub use resolver::{tag_for_model, DynamicSerializerFn, ResolveTarget, Resolver};
pub use serializer::{Registry, RenderContext, Serializer, SerializerBuilder};
pub use store::MemoryStore;
pub use types::{Accessor, Computed, Params, Predicate, RenderConfig};
