//! In-memory record store.
//!
//! Backs the command-line tool and the test suite with a [`Record`]
//! implementation over plain JSON objects. Associations are resolved lazily
//! by foreign-key scan against the owning store, using the [`ModelGraph`]
//! registered at construction.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use serde_json::{Map, Value};

use crate::model::{AssociationKind, ModelGraph, Record, RelatedTarget, SharedRecord};

struct StoreInner {
    graph: Arc<ModelGraph>,
    records: RwLock<HashMap<String, Vec<Arc<StoredRecord>>>>,
}

/// A store of JSON records grouped by model name.
///
/// Cheap to clone; clones share the same underlying data.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    pub fn new(graph: Arc<ModelGraph>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                graph,
                records: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Insert one record under `model`. Non-object values insert as an
    /// empty record.
    pub fn insert(&self, model: impl Into<String>, fields: Value) -> SharedRecord {
        let model = model.into();
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let record = Arc::new(StoredRecord {
            model: model.clone(),
            fields,
            store: Arc::downgrade(&self.inner),
        });
        let mut records = self
            .inner
            .records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records.entry(model).or_default().push(record.clone());
        record
    }

    /// Find the record of `model` whose `id` field equals `id`.
    pub fn find(&self, model: &str, id: &Value) -> Option<SharedRecord> {
        self.inner.find(model, id).map(|r| r as SharedRecord)
    }

    /// All records of `model`, in insertion order.
    pub fn all(&self, model: &str) -> Vec<SharedRecord> {
        let records = self
            .inner
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records
            .get(model)
            .map(|list| list.iter().map(|r| r.clone() as SharedRecord).collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let records = self
            .inner
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut counts: Vec<(&String, usize)> =
            records.iter().map(|(model, list)| (model, list.len())).collect();
        counts.sort();
        f.debug_struct("MemoryStore").field("records", &counts).finish()
    }
}

impl StoreInner {
    fn find(&self, model: &str, id: &Value) -> Option<Arc<StoredRecord>> {
        let records = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records
            .get(model)?
            .iter()
            .find(|r| r.fields.get("id") == Some(id))
            .cloned()
    }

    fn matching(&self, model: &str, field: &str, value: &Value) -> Vec<Arc<StoredRecord>> {
        let records = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records
            .get(model)
            .map(|list| {
                list.iter()
                    .filter(|r| r.fields.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

struct StoredRecord {
    model: String,
    fields: Map<String, Value>,
    // weak so records can outlive the store without a reference cycle;
    // relations read as absent once the store is gone
    store: Weak<StoreInner>,
}

impl Record for StoredRecord {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn id(&self) -> Value {
        self.get("id")
    }

    fn get(&self, field: &str) -> Value {
        self.fields.get(field).cloned().unwrap_or(Value::Null)
    }

    fn related_one(&self, name: &str) -> Option<SharedRecord> {
        let store = self.store.upgrade()?;
        let assoc = store.graph.association_for(&self.model, name)?;
        let fk = assoc.foreign_key.as_deref()?;
        match assoc.kind {
            AssociationKind::BelongsTo => {
                let id = self.fields.get(fk)?;
                if id.is_null() {
                    return None;
                }
                let target = match &assoc.target {
                    RelatedTarget::Model(model) => model.clone(),
                    RelatedTarget::Polymorphic { type_field } => {
                        self.fields.get(type_field)?.as_str()?.to_string()
                    }
                };
                store.find(&target, id).map(|r| r as SharedRecord)
            }
            AssociationKind::HasOne | AssociationKind::HasMany => {
                let target = match &assoc.target {
                    RelatedTarget::Model(model) => model,
                    RelatedTarget::Polymorphic { .. } => return None,
                };
                store
                    .matching(target, fk, &self.id())
                    .into_iter()
                    .next()
                    .map(|r| r as SharedRecord)
            }
        }
    }

    fn related_many(&self, name: &str) -> Vec<SharedRecord> {
        let Some(store) = self.store.upgrade() else {
            return Vec::new();
        };
        let Some(assoc) = store.graph.association_for(&self.model, name) else {
            return Vec::new();
        };
        let (Some(fk), RelatedTarget::Model(target)) = (assoc.foreign_key.as_deref(), &assoc.target)
        else {
            return Vec::new();
        };
        store
            .matching(target, fk, &self.id())
            .into_iter()
            .map(|r| r as SharedRecord)
            .collect()
    }
}

impl std::fmt::Debug for StoredRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredRecord")
            .field("model", &self.model)
            .field("id", &self.fields.get("id"))
            .finish()
    }
}
