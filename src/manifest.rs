//! Manifest files: a declarative JSON description of models, serializer
//! definitions, and records, used by the command-line tool.
//!
//! A manifest carries three sections. `models` describes the association
//! graph, `serializers` the per-type mappings, and `records` the data to
//! render. Declaration order is preserved throughout, so output field order
//! follows the manifest.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ManifestError;
use crate::model::{Association, ModelGraph, ModelType};
use crate::relationship::Relationship;
use crate::serializer::{Registry, SerializerBuilder};
use crate::attribute::Attribute;
use crate::store::MemoryStore;

/// Top-level manifest document.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub models: IndexMap<String, ModelDef>,
    #[serde(default)]
    pub serializers: IndexMap<String, SerializerDef>,
    #[serde(default)]
    pub records: IndexMap<String, Vec<Value>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ModelDef {
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub associations: IndexMap<String, AssociationDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssociationDef {
    pub kind: KindDef,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub foreign_key: Option<String>,
    /// Discriminator field; makes a `belongs_to` polymorphic.
    #[serde(default)]
    pub type_field: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindDef {
    BelongsTo,
    HasOne,
    HasMany,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SerializerDef {
    /// Model name bound directly to this definition, for models whose
    /// convention-derived tag does not apply.
    #[serde(default)]
    pub model: Option<String>,
    /// Type tag of a parent definition whose fields this one starts from.
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub id_field: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
    #[serde(default)]
    pub relationships: IndexMap<String, RelationshipDef>,
}

/// An attribute, either a bare field name or a renamed one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AttributeDef {
    Name(String),
    Renamed { name: String, field: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipDef {
    pub kind: KindDef,
    /// Record-level association name, when it differs from the
    /// relationship name.
    #[serde(default)]
    pub via: Option<String>,
    /// Fixed serializer type tag for the related records.
    #[serde(default)]
    pub serializer: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub force_data: bool,
}

/// Everything a render needs, built from a manifest.
#[derive(Debug)]
pub struct World {
    pub graph: Arc<ModelGraph>,
    pub registry: Arc<Registry>,
    pub store: MemoryStore,
}

impl Manifest {
    /// Load a manifest from a file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let text = fs::read_to_string(path).map_err(|source| ManifestError::ReadError {
            path: path.display().to_string(),
            source,
        })?;
        let manifest: Manifest = serde_json::from_str(&text)?;
        debug!(
            path = %path.display(),
            models = manifest.models.len(),
            serializers = manifest.serializers.len(),
            "loaded manifest"
        );
        Ok(manifest)
    }

    /// Validate the manifest and build the graph, registry, and store.
    pub fn build(&self) -> Result<World, ManifestError> {
        let graph = Arc::new(self.build_graph()?);
        let registry = Arc::new(self.build_registry()?);
        let store = MemoryStore::new(graph.clone());
        for (model, records) in &self.records {
            if !self.models.contains_key(model) {
                return Err(ManifestError::Invalid {
                    message: format!("records reference undeclared model {model:?}"),
                });
            }
            for record in records {
                if !record.is_object() {
                    return Err(ManifestError::Invalid {
                        message: format!("record of model {model:?} is not an object"),
                    });
                }
                store.insert(model.clone(), record.clone());
            }
        }
        Ok(World {
            graph,
            registry,
            store,
        })
    }

    fn build_graph(&self) -> Result<ModelGraph, ManifestError> {
        let mut graph = ModelGraph::new();
        for (name, def) in &self.models {
            if let Some(parent) = &def.parent {
                if !self.models.contains_key(parent) {
                    return Err(ManifestError::Invalid {
                        message: format!(
                            "model {name:?} names undeclared parent {parent:?}"
                        ),
                    });
                }
            }
            let mut model = ModelType::new(name.clone());
            if let Some(parent) = &def.parent {
                model = model.parent(parent.clone());
            }
            for (assoc_name, assoc) in &def.associations {
                model = model.association(assoc_name.clone(), assoc.to_association(name, assoc_name)?);
            }
            graph.register(model);
        }
        Ok(graph)
    }

    fn build_registry(&self) -> Result<Registry, ManifestError> {
        let mut registry = Registry::new();
        // parents must be built before children; loop until a pass makes no
        // progress, which flags cycles and unknown parents alike
        let mut pending: Vec<&String> = self.serializers.keys().collect();
        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|tag| {
                let def = &self.serializers[*tag];
                let parent = match &def.extends {
                    Some(parent_tag) => match registry.by_tag(parent_tag) {
                        Some(parent) => Some(parent),
                        None => return true,
                    },
                    None => None,
                };
                let serializer = def.to_serializer(tag, parent.as_deref());
                if let Some(model) = &def.model {
                    registry.register_for_model(model.clone(), serializer.clone());
                }
                registry.register(serializer);
                false
            });
            if pending.len() == before {
                return Err(ManifestError::Invalid {
                    message: format!(
                        "serializer {:?} extends an undeclared or cyclic parent",
                        pending[0]
                    ),
                });
            }
        }
        Ok(registry)
    }
}

impl AssociationDef {
    fn to_association(&self, model: &str, name: &str) -> Result<Association, ManifestError> {
        let invalid = |message: String| ManifestError::Invalid { message };
        match self.kind {
            KindDef::BelongsTo => {
                let fk = self.foreign_key.clone().ok_or_else(|| {
                    invalid(format!(
                        "belongs_to {name:?} on model {model:?} needs a foreign_key"
                    ))
                })?;
                match (&self.model, &self.type_field) {
                    (None, Some(type_field)) => {
                        Ok(Association::belongs_to_polymorphic(fk, type_field.clone()))
                    }
                    (Some(target), None) => Ok(Association::belongs_to(fk, target.clone())),
                    _ => Err(invalid(format!(
                        "belongs_to {name:?} on model {model:?} needs exactly one of model or type_field"
                    ))),
                }
            }
            KindDef::HasOne | KindDef::HasMany => {
                let target = self.model.clone().ok_or_else(|| {
                    invalid(format!(
                        "{name:?} on model {model:?} needs a target model"
                    ))
                })?;
                let fk = self.foreign_key.clone().ok_or_else(|| {
                    invalid(format!(
                        "{name:?} on model {model:?} needs a foreign_key"
                    ))
                })?;
                if self.type_field.is_some() {
                    return Err(invalid(format!(
                        "{name:?} on model {model:?}: type_field is only valid on belongs_to"
                    )));
                }
                match self.kind {
                    KindDef::HasOne => Ok(Association::has_one(target, fk)),
                    _ => Ok(Association::has_many(target, fk)),
                }
            }
        }
    }
}

impl SerializerDef {
    fn to_serializer(
        &self,
        tag: &str,
        parent: Option<&crate::serializer::Serializer>,
    ) -> Arc<crate::serializer::Serializer> {
        let mut builder = match parent {
            Some(parent) => SerializerBuilder::extending(tag, parent),
            None => SerializerBuilder::new(tag),
        };
        if let Some(field) = &self.id_field {
            builder = builder.id_field(field.clone());
        }
        for attribute in &self.attributes {
            builder = match attribute {
                AttributeDef::Name(name) => builder.attribute(name.clone()),
                AttributeDef::Renamed { name, field } => builder
                    .attribute_with(Attribute::new(name.clone()).from_field(field.clone())),
            };
        }
        for (name, def) in &self.relationships {
            let mut relationship = match def.kind {
                KindDef::BelongsTo => Relationship::belongs_to(name.clone()),
                KindDef::HasOne => Relationship::has_one(name.clone()),
                KindDef::HasMany => Relationship::has_many(name.clone()),
            };
            if let Some(via) = &def.via {
                relationship = relationship.via(via.clone());
            }
            if let Some(serializer) = &def.serializer {
                relationship = relationship.serializer(serializer.as_str());
            }
            if let Some(link) = &def.link {
                relationship = relationship.link(link.clone());
            }
            if def.force_data {
                relationship = relationship.force_data(true);
            }
            builder = builder.relationship(relationship);
        }
        builder.build()
    }
}
