//! The record-side interface: domain records, association metadata, and the
//! eager-loading collaborator.
//!
//! The engine never talks to a data store directly. It reads records through
//! the [`Record`] trait, consults a [`ModelGraph`] for association metadata
//! (foreign keys, polymorphism, inheritance), and hands eager-load plans to a
//! [`DataLoader`] before serialization begins.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::include::IncludeTree;

/// A domain record as the engine sees it.
///
/// Implementations are expected to be cheap views over already-materialized
/// data; any blocking I/O belongs in the [`DataLoader`] collaborator, which
/// runs before serialization.
pub trait Record: Send + Sync {
    /// Model type name used for serializer resolution (e.g. `"User"`).
    fn model_name(&self) -> &str;

    /// The record's primary identity.
    fn id(&self) -> Value;

    /// Read a scalar field. Missing fields read as null.
    fn get(&self, field: &str) -> Value;

    /// The record on the other side of a to-one association.
    fn related_one(&self, name: &str) -> Option<SharedRecord>;

    /// The full collection behind a to-many association.
    fn related_many(&self, name: &str) -> Vec<SharedRecord>;
}

/// Shared handle to a record; related records are returned by shared handle
/// so one object can sit on multiple paths of the graph.
pub type SharedRecord = Arc<dyn Record>;

/// The shape of a record-level association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// To-one held by a foreign key on this model.
    BelongsTo,
    /// To-one held by a foreign key on the related model.
    HasOne,
    /// To-many held by a foreign key on the related model.
    HasMany,
}

/// The statically-declared target of an association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelatedTarget {
    /// The related model is known at registration time.
    Model(String),
    /// The related model is named at runtime by a discriminator field
    /// alongside the foreign key.
    Polymorphic { type_field: String },
}

/// Association metadata for one relation on a model.
#[derive(Debug, Clone)]
pub struct Association {
    pub kind: AssociationKind,
    /// For `BelongsTo`: the foreign key field on this model.
    /// For `HasOne`/`HasMany`: the foreign key field on the target model.
    pub foreign_key: Option<String>,
    pub target: RelatedTarget,
}

impl Association {
    pub fn belongs_to(foreign_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            kind: AssociationKind::BelongsTo,
            foreign_key: Some(foreign_key.into()),
            target: RelatedTarget::Model(model.into()),
        }
    }

    pub fn belongs_to_polymorphic(
        foreign_key: impl Into<String>,
        type_field: impl Into<String>,
    ) -> Self {
        Self {
            kind: AssociationKind::BelongsTo,
            foreign_key: Some(foreign_key.into()),
            target: RelatedTarget::Polymorphic {
                type_field: type_field.into(),
            },
        }
    }

    pub fn has_one(model: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind: AssociationKind::HasOne,
            foreign_key: Some(foreign_key.into()),
            target: RelatedTarget::Model(model.into()),
        }
    }

    pub fn has_many(model: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind: AssociationKind::HasMany,
            foreign_key: Some(foreign_key.into()),
            target: RelatedTarget::Model(model.into()),
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self.target, RelatedTarget::Polymorphic { .. })
    }
}

/// A model type: its name, optional parent model, and associations.
#[derive(Debug, Clone, Default)]
pub struct ModelType {
    pub name: String,
    /// Parent model for inheritance; serializer resolution and association
    /// lookup fall back to the parent chain.
    pub parent: Option<String>,
    pub associations: IndexMap<String, Association>,
}

impl ModelType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            associations: IndexMap::new(),
        }
    }

    pub fn parent(mut self, name: impl Into<String>) -> Self {
        self.parent = Some(name.into());
        self
    }

    pub fn association(mut self, name: impl Into<String>, association: Association) -> Self {
        self.associations.insert(name.into(), association);
        self
    }
}

/// Registry of model types.
///
/// Populated once at startup and read-only thereafter; shared as `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ModelGraph {
    models: HashMap<String, ModelType>,
}

impl ModelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, model: ModelType) {
        self.models.insert(model.name.clone(), model);
    }

    pub fn model(&self, name: &str) -> Option<&ModelType> {
        self.models.get(name)
    }

    /// The parent model name of `name`, if registered.
    pub fn parent_of(&self, name: &str) -> Option<&str> {
        self.models.get(name)?.parent.as_deref()
    }

    /// Look up an association by name, walking the parent chain so subclass
    /// models see their ancestors' associations.
    pub fn association_for(&self, model: &str, name: &str) -> Option<&Association> {
        let mut current = Some(model);
        while let Some(model_name) = current {
            let model_type = self.models.get(model_name)?;
            if let Some(association) = model_type.associations.get(name) {
                return Some(association);
            }
            current = model_type.parent.as_deref();
        }
        None
    }
}

/// External collaborator that materializes relationships ahead of
/// serialization.
///
/// The renderer computes an eager-load plan and hands it over before walking
/// the record graph. Loader failures surface later as ordinary record-access
/// behavior (absent relations read as empty), not as a distinct error kind.
pub trait DataLoader: Send + Sync {
    /// Materialize every relationship named in the plan on the given records.
    fn load(&self, records: &[SharedRecord], plan: &IncludeTree);
}

/// Loader for inputs that need no loading (already-materialized graphs).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLoader;

impl DataLoader for NoopLoader {
    fn load(&self, _records: &[SharedRecord], _plan: &IncludeTree) {}
}
