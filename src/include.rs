//! Include request normalization.
//!
//! An include request arrives in one of several shapes: a bare relation name,
//! an ordered sequence mixing names and nested maps, a mapping of name to
//! children, or the JSON:API query-parameter syntax (`"posts.comments,organization"`).
//! All of them normalize into one canonical [`IncludeTree`]: an ordered
//! mapping from relation name to child tree, with duplicate names unioned
//! rather than overwritten.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::IncludeError;
use crate::types::json_type_name;

/// Canonical include tree: ordered relation name to child tree, no duplicate
/// keys at any level. An empty tree is a leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeTree {
    children: IndexMap<String, IncludeTree>,
}

impl IncludeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize an arbitrary include value.
    ///
    /// Accepted shapes: a string (one relation), an array (sequence of any
    /// accepted shape), an object (relation name to nested value), or null
    /// (empty tree). Duplicate names union their children in first-appearance
    /// order.
    ///
    /// # Errors
    ///
    /// Returns `IncludeError::Malformed` for any other JSON type.
    pub fn from_value(value: &Value) -> Result<Self, IncludeError> {
        let mut tree = IncludeTree::new();
        compact(value, &mut tree)?;
        Ok(tree)
    }

    /// Parse the JSON:API `include` query-parameter syntax.
    ///
    /// Comma-separated paths, dots descending into relationships:
    /// `"organization,posts.comments"`. Surrounding whitespace around each
    /// path is ignored; a blank path is skipped so trailing commas are fine.
    ///
    /// # Errors
    ///
    /// Returns `IncludeError::EmptyName` when a path contains an empty
    /// segment (e.g. `"posts..comments"`).
    pub fn parse(input: &str) -> Result<Self, IncludeError> {
        let mut tree = IncludeTree::new();
        for path in input.split(',') {
            let path = path.trim();
            if path.is_empty() {
                continue;
            }
            let mut node = &mut tree;
            for segment in path.split('.') {
                if segment.is_empty() {
                    return Err(IncludeError::EmptyName {
                        path: path.to_string(),
                    });
                }
                node = node.children.entry(segment.to_string()).or_default();
            }
        }
        Ok(tree)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether `name` appears at the top level of this tree.
    pub fn contains(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&IncludeTree> {
        self.children.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IncludeTree)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Insert a relation, returning its child tree.
    pub fn insert(&mut self, name: impl Into<String>) -> &mut IncludeTree {
        self.children.entry(name.into()).or_default()
    }

    /// Union another tree into this one, merging children of shared names.
    pub fn merge(&mut self, other: &IncludeTree) {
        for (name, child) in &other.children {
            self.children.entry(name.clone()).or_default().merge(child);
        }
    }

    /// Canonical single-line form, e.g. `"organization,posts(comments)"`.
    ///
    /// Equal trees produce equal strings, so this doubles as a cache key
    /// component for the eager-load planner.
    pub fn cache_key(&self) -> String {
        let mut parts = Vec::with_capacity(self.children.len());
        for (name, child) in &self.children {
            if child.is_empty() {
                parts.push(name.clone());
            } else {
                parts.push(format!("{}({})", name, child.cache_key()));
            }
        }
        parts.join(",")
    }

    /// The tree as nested JSON objects, leaves as empty objects.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (name, child) in &self.children {
            map.insert(name.clone(), child.to_value());
        }
        Value::Object(map)
    }
}

fn compact(value: &Value, into: &mut IncludeTree) -> Result<(), IncludeError> {
    match value {
        Value::Null => Ok(()),
        Value::String(name) => {
            if name.is_empty() {
                return Err(IncludeError::EmptyName {
                    path: String::new(),
                });
            }
            into.insert(name.as_str());
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                compact(item, into)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (name, children) in map {
                let child = into.insert(name.as_str());
                compact(children, child)?;
            }
            Ok(())
        }
        other => Err(IncludeError::Malformed {
            actual: json_type_name(other).to_string(),
        }),
    }
}

impl From<&str> for IncludeTree {
    /// Convenience for a single relation name.
    fn from(name: &str) -> Self {
        let mut tree = IncludeTree::new();
        tree.insert(name);
        tree
    }
}
