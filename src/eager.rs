//! Eager-load planning.
//!
//! Maps (model, include tree, serializer) to the minimal set of
//! relationships that must be materialized before serialization, so the
//! depth-first walk never triggers a deferred per-record fetch. The mapping
//! is a pure function of its inputs and is memoized for the process
//! lifetime.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::RenderError;
use crate::include::IncludeTree;
use crate::model::{AssociationKind, ModelGraph, RelatedTarget};
use crate::relationship::SerializerRef;
use crate::resolver::{ResolveTarget, Resolver};
use crate::serializer::Serializer;

/// A tree of relation names marking what must be materialized; the same
/// shape as an include tree.
pub type EagerLoadPlan = IncludeTree;

/// Computes and caches eager-load plans.
///
/// Cache writes race idempotently: plans are pure, so recomputing and
/// overwriting with an equal value is harmless.
pub struct EagerLoadPlanner {
    resolver: Arc<Resolver>,
    graph: Arc<ModelGraph>,
    cache: RwLock<HashMap<String, EagerLoadPlan>>,
}

impl EagerLoadPlanner {
    pub fn new(resolver: Arc<Resolver>, graph: Arc<ModelGraph>) -> Self {
        Self {
            resolver,
            graph,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The load plan for rendering `model` through `serializer` with the
    /// given include request.
    ///
    /// A relationship enters the plan when its record-level association
    /// exists on the model and any of the following holds: it is named in
    /// the include tree, it is a has_one (producing even a bare reference
    /// requires the record), or its force-data policy could emit data (a
    /// predicate counts, since it has the potential to). Polymorphic
    /// associations are planned without children; their related type is not
    /// known ahead of time.
    pub fn plan(
        &self,
        model: &str,
        include: &IncludeTree,
        serializer: &Arc<Serializer>,
    ) -> Result<EagerLoadPlan, RenderError> {
        // Key by definition identity, not type tag: two distinct definitions
        // may share a tag and produce different plans.
        let key = format!(
            "{}:{}:{:p}",
            model,
            include.cache_key(),
            Arc::as_ptr(serializer)
        );
        if let Some(hit) = self
            .cache
            .read()
            .ok()
            .and_then(|cache| cache.get(&key).cloned())
        {
            return Ok(hit);
        }

        let plan = self.resolve_plan(model, include, serializer)?;

        if let Ok(mut cache) = self.cache.write() {
            debug!(key = %key, plan = %plan.cache_key(), "caching eager-load plan");
            cache.entry(key).or_insert_with(|| plan.clone());
        }
        Ok(plan)
    }

    fn resolve_plan(
        &self,
        model: &str,
        include: &IncludeTree,
        serializer: &Arc<Serializer>,
    ) -> Result<EagerLoadPlan, RenderError> {
        let mut plan = EagerLoadPlan::new();

        for (name, relationship) in serializer.relationships() {
            let Some(association) = self
                .graph
                .association_for(model, relationship.planned_association())
            else {
                continue;
            };

            let wanted = include.contains(name)
                || association.kind == AssociationKind::HasOne
                || relationship.force_data_policy().possible();
            if !wanted {
                continue;
            }

            match &association.target {
                RelatedTarget::Polymorphic { .. } => {
                    plan.insert(name);
                }
                RelatedTarget::Model(target) => {
                    let target = target.clone();
                    let child_serializer = match relationship.serializer_ref() {
                        SerializerRef::Fixed(fixed) => self.resolver.resolve(fixed)?,
                        _ => self.resolver.resolve(&ResolveTarget::Model(target.clone()))?,
                    };
                    let empty = IncludeTree::new();
                    let children = include.get(name).unwrap_or(&empty);
                    let subplan = self.plan(&target, children, &child_serializer)?;
                    *plan.insert(name) = subplan;
                }
            }
        }

        Ok(plan)
    }
}
