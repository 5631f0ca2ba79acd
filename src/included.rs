//! Identity-keyed accumulator for the `included` section.

use indexmap::IndexMap;
use serde_json::Value;

/// Serialized related objects, keyed by `(type, id)` so the same logical
/// record is serialized at most once per document regardless of how many
/// paths reach it. Insertion order is preserved.
///
/// One instance is scoped to one document render; collection renders share a
/// single set across all root records.
#[derive(Debug, Clone, Default)]
pub struct IncludedSet {
    entries: IndexMap<(String, String), Value>,
}

impl IncludedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable identity key for a resolved type tag and raw id.
    ///
    /// The id is keyed by its canonical JSON text so `7` and `"7"` stay
    /// distinct, matching the distinction in the output document.
    fn key(type_tag: &str, id: &Value) -> (String, String) {
        (type_tag.to_string(), id.to_string())
    }

    pub fn contains(&self, type_tag: &str, id: &Value) -> bool {
        self.entries.contains_key(&Self::key(type_tag, id))
    }

    /// Record a serialized object. First insertion wins; re-inserting the
    /// same identity is ignored.
    pub fn insert(&mut self, type_tag: &str, id: &Value, serialized: Value) {
        self.entries.entry(Self::key(type_tag, id)).or_insert(serialized);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The serialized objects in insertion order.
    pub fn into_values(self) -> Vec<Value> {
        self.entries.into_values().collect()
    }
}
