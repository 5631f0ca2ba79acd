//! Relationship output fields and their link/data policy.
//!
//! Three variants. `belongs_to` is a to-one whose reference can usually be
//! derived from a foreign key without fetching the related record. `has_one`
//! is a to-one that must always fetch, because nothing on the record itself
//! names the related id. `has_many` is the to-many variant, suppressed by
//! default: it emits nothing unless it is included, forced, or linked.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::RenderError;
use crate::include::IncludeTree;
use crate::included::IncludedSet;
use crate::model::{Association, AssociationKind, Record, RelatedTarget, SharedRecord};
use crate::resolver::{DynamicSerializerFn, ResolveTarget};
use crate::serializer::{RenderContext, Serializer};
use crate::types::{json_type_name, Computed, Params, Predicate};

/// Which relationship variant this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    BelongsTo,
    HasOne,
    HasMany,
}

/// Per-record to-one fetch function.
pub type RelatedOneFn =
    Arc<dyn Fn(&dyn Record, &Params) -> Option<SharedRecord> + Send + Sync>;

/// Per-record to-many fetch function.
pub type RelatedManyFn = Arc<dyn Fn(&dyn Record, &Params) -> Vec<SharedRecord> + Send + Sync>;

/// How the related record(s) are obtained.
#[derive(Clone)]
pub enum RelatedAccessor {
    /// A record-level association, fetched through the [`Record`] trait.
    Association(String),
    /// A computed to-one fetch.
    ComputedOne(RelatedOneFn),
    /// A computed to-many fetch.
    ComputedMany(RelatedManyFn),
}

impl fmt::Debug for RelatedAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelatedAccessor::Association(name) => write!(f, "Association({name:?})"),
            RelatedAccessor::ComputedOne(_) => write!(f, "ComputedOne"),
            RelatedAccessor::ComputedMany(_) => write!(f, "ComputedMany"),
        }
    }
}

/// Which serializer renders the related record. Exactly one choice is
/// active; resolving from the related value itself is the default.
#[derive(Clone, Default)]
pub enum SerializerRef {
    /// Resolve from the related record at call time.
    #[default]
    Resolve,
    /// A fixed target, resolved once through the memoized resolver.
    Fixed(ResolveTarget),
    /// Chosen per record by a function.
    Dynamic(DynamicSerializerFn),
}

impl fmt::Debug for SerializerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializerRef::Resolve => write!(f, "Resolve"),
            SerializerRef::Fixed(target) => write!(f, "Fixed({target:?})"),
            SerializerRef::Dynamic(_) => write!(f, "Dynamic"),
        }
    }
}

/// The related-resource link, static or computed. A computed link returning
/// null suppresses the link.
#[derive(Clone)]
pub enum Link {
    Static(Value),
    Computed(Computed),
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Static(v) => write!(f, "Static({v})"),
            Link::Computed(_) => write!(f, "Computed"),
        }
    }
}

/// Policy overriding the default link-only / suppressed behavior to also
/// emit a data reference.
#[derive(Debug, Clone, Default)]
pub enum ForceData {
    #[default]
    Never,
    Always,
    When(Predicate),
}

impl ForceData {
    fn applies(&self, record: &dyn Record, params: &Params) -> bool {
        match self {
            ForceData::Never => false,
            ForceData::Always => true,
            ForceData::When(predicate) => predicate.call(record, params),
        }
    }

    /// Whether this policy could emit data, without evaluating anything.
    /// A predicate counts: it has the potential to.
    pub fn possible(&self) -> bool {
        !matches!(self, ForceData::Never)
    }
}

/// One relationship output field.
#[derive(Debug, Clone)]
pub struct Relationship {
    name: String,
    kind: RelationshipKind,
    accessor: RelatedAccessor,
    serializer: SerializerRef,
    link: Option<Link>,
    force_data: ForceData,
    predicate: Option<Predicate>,
}

impl Relationship {
    pub fn belongs_to(name: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::BelongsTo)
    }

    pub fn has_one(name: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::HasOne)
    }

    pub fn has_many(name: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::HasMany)
    }

    fn new(name: impl Into<String>, kind: RelationshipKind) -> Self {
        let name = name.into();
        Self {
            accessor: RelatedAccessor::Association(name.clone()),
            name,
            kind,
            serializer: SerializerRef::Resolve,
            link: None,
            force_data: ForceData::Never,
            predicate: None,
        }
    }

    /// Read the relationship through a differently-named association.
    pub fn via(mut self, association: impl Into<String>) -> Self {
        self.accessor = RelatedAccessor::Association(association.into());
        self
    }

    /// Fetch the related record with a function.
    pub fn computed_one(mut self, f: RelatedOneFn) -> Self {
        self.accessor = RelatedAccessor::ComputedOne(f);
        self
    }

    /// Fetch the related collection with a function.
    pub fn computed_many(mut self, f: RelatedManyFn) -> Self {
        self.accessor = RelatedAccessor::ComputedMany(f);
        self
    }

    /// Serialize related records with a fixed serializer (a definition, a
    /// type tag, or a model name).
    pub fn serializer(mut self, target: impl Into<ResolveTarget>) -> Self {
        self.serializer = SerializerRef::Fixed(target.into());
        self
    }

    /// Choose the serializer per record.
    pub fn serializer_with(mut self, f: DynamicSerializerFn) -> Self {
        self.serializer = SerializerRef::Dynamic(f);
        self
    }

    /// Emit a related link.
    pub fn link(mut self, value: impl Into<String>) -> Self {
        self.link = Some(Link::Static(Value::String(value.into())));
        self
    }

    /// Emit a related link computed per record; a null result suppresses it.
    pub fn link_with(mut self, computed: Computed) -> Self {
        self.link = Some(Link::Computed(computed));
        self
    }

    /// Always emit a data reference, even alongside a link (to-one) or
    /// without being included (to-many).
    pub fn force_data(mut self, force: bool) -> Self {
        self.force_data = if force { ForceData::Always } else { ForceData::Never };
        self
    }

    /// Emit a data reference when the predicate holds.
    pub fn force_data_when(mut self, predicate: Predicate) -> Self {
        self.force_data = ForceData::When(predicate);
        self
    }

    /// Serialize this relationship only when the predicate holds.
    pub fn only_if(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationshipKind {
        self.kind
    }

    pub fn force_data_policy(&self) -> &ForceData {
        &self.force_data
    }

    pub fn serializer_ref(&self) -> &SerializerRef {
        &self.serializer
    }

    /// The record-level association name this relationship reads, for
    /// association metadata lookup. Computed accessors fall back to the
    /// relationship name.
    pub fn planned_association(&self) -> &str {
        match &self.accessor {
            RelatedAccessor::Association(name) => name,
            _ => &self.name,
        }
    }

    /// Whether this relationship's field is serialized at all.
    ///
    /// To-one relationships default to emitting a reference, so only the
    /// predicate gates them. To-many relationships are suppressed unless a
    /// link is configured, force-data applies, or they are being included.
    pub fn enabled(&self, record: &dyn Record, params: &Params, included: bool) -> bool {
        if let Some(predicate) = &self.predicate {
            if !predicate.call(record, params) {
                return false;
            }
        }
        if self.kind != RelationshipKind::HasMany {
            return true;
        }
        if self.link.is_some() {
            return true;
        }
        if self.force_data.applies(record, params) {
            return true;
        }
        included
    }

    /// Whether this relationship participates in an `included` walk. Only
    /// the predicate applies: inclusion was requested explicitly.
    pub fn enabled_for_included(&self, record: &dyn Record, params: &Params) -> bool {
        match &self.predicate {
            Some(predicate) => predicate.call(record, params),
            None => true,
        }
    }

    /// Serialize the relationship field value: `{links?, data?}` merged, or
    /// nothing when neither applies.
    pub fn serialize(
        &self,
        record: &dyn Record,
        ctx: &RenderContext<'_>,
        included: bool,
    ) -> Result<Option<Value>, RenderError> {
        match self.kind {
            RelationshipKind::HasMany => self.serialize_many(record, ctx, included),
            _ => self.serialize_one(record, ctx, included),
        }
    }

    fn serialize_one(
        &self,
        record: &dyn Record,
        ctx: &RenderContext<'_>,
        included: bool,
    ) -> Result<Option<Value>, RenderError> {
        let link = self.serialize_link(record, ctx.params);

        // Emit a reference unless a link already stands in for it.
        let want_reference =
            link.is_none() || included || self.force_data.applies(record, ctx.params);
        let reference = if want_reference {
            // The included pass and computed accessors/serializers need the
            // record itself; otherwise a belongs_to derives the reference
            // from its foreign key without fetching.
            let fetched = if included || self.requires_record() {
                self.reference_by_related(record, ctx)?
            } else {
                self.reference_by_key(record, ctx)?
            };
            Some(fetched)
        } else {
            None
        };

        Ok(merge_parts(link, reference))
    }

    fn serialize_many(
        &self,
        record: &dyn Record,
        ctx: &RenderContext<'_>,
        included: bool,
    ) -> Result<Option<Value>, RenderError> {
        let link = self.serialize_link(record, ctx.params);

        let want_data = included || self.force_data.applies(record, ctx.params);
        let data = if want_data {
            let members = self.related_many(record, ctx.params);
            let mut references = Vec::with_capacity(members.len());
            for member in &members {
                let serializer = self.resolve_serializer(member.as_ref(), ctx)?;
                let id = serializer.id_for(member.as_ref(), ctx.params);
                references.push(reference_object(serializer.type_tag(), id, ctx));
            }
            let mut map = Map::new();
            map.insert("data".to_string(), Value::Array(references));
            Some(Value::Object(map))
        } else {
            None
        };

        Ok(merge_parts(link, data))
    }

    /// Serialize the related record(s) into `set`, recursing into
    /// `children` for their own relationships. Records already present by
    /// identity are not serialized again.
    pub fn serialize_included(
        &self,
        record: &dyn Record,
        children: &IncludeTree,
        ctx: &RenderContext<'_>,
        set: &mut IncludedSet,
    ) -> Result<(), RenderError> {
        match self.kind {
            RelationshipKind::HasMany => {
                for member in self.related_many(record, ctx.params) {
                    self.include_record(member, children, ctx, set)?;
                }
                Ok(())
            }
            _ => match self.related_one(record, ctx.params) {
                Some(related) => self.include_record(related, children, ctx, set),
                None => Ok(()),
            },
        }
    }

    fn include_record(
        &self,
        related: SharedRecord,
        children: &IncludeTree,
        ctx: &RenderContext<'_>,
        set: &mut IncludedSet,
    ) -> Result<(), RenderError> {
        let serializer = self.resolve_serializer(related.as_ref(), ctx)?;
        let id = serializer.id_for(related.as_ref(), ctx.params);
        if !set.contains(serializer.type_tag(), &id) {
            let serialized = serializer.serialize(related.as_ref(), &IncludeTree::new(), ctx)?;
            set.insert(serializer.type_tag(), &id, serialized);
        }
        if !children.is_empty() {
            serializer.serialize_included(related.as_ref(), children, ctx, set)?;
        }
        Ok(())
    }

    /// Whether producing even a bare reference requires the related record:
    /// has_one always does, and so do computed accessors and per-record
    /// serializers.
    fn requires_record(&self) -> bool {
        self.kind == RelationshipKind::HasOne
            || !matches!(self.accessor, RelatedAccessor::Association(_))
            || matches!(self.serializer, SerializerRef::Dynamic(_))
    }

    fn serialize_link(&self, record: &dyn Record, params: &Params) -> Option<Value> {
        let value = match self.link.as_ref()? {
            Link::Static(value) => value.clone(),
            Link::Computed(computed) => computed.call(record, params),
        };
        if value.is_null() {
            return None;
        }
        let mut related = Map::new();
        related.insert("related".to_string(), value);
        let mut links = Map::new();
        links.insert("links".to_string(), Value::Object(related));
        Some(Value::Object(links))
    }

    /// Reference derived by fetching the related record.
    fn reference_by_related(
        &self,
        record: &dyn Record,
        ctx: &RenderContext<'_>,
    ) -> Result<Value, RenderError> {
        match self.related_one(record, ctx.params) {
            None => Ok(data_value(Value::Null)),
            Some(related) => {
                let serializer = self.resolve_serializer(related.as_ref(), ctx)?;
                let id = serializer.id_for(related.as_ref(), ctx.params);
                Ok(data_value(reference_object(
                    serializer.type_tag(),
                    id,
                    ctx,
                )))
            }
        }
    }

    /// Reference derived from the record's own foreign key, without
    /// materializing the related record. Falls back to fetching when the
    /// record-level association is not a belongs_to.
    fn reference_by_key(
        &self,
        record: &dyn Record,
        ctx: &RenderContext<'_>,
    ) -> Result<Value, RenderError> {
        let association = ctx
            .graph
            .association_for(record.model_name(), self.planned_association());
        match association {
            Some(association) if association.kind == AssociationKind::BelongsTo => {
                // Clone out of the graph borrow before touching the resolver.
                let association = association.clone();
                self.reference_by_foreign_key(record, &association, ctx)
            }
            _ => self.reference_by_related(record, ctx),
        }
    }

    fn reference_by_foreign_key(
        &self,
        record: &dyn Record,
        association: &Association,
        ctx: &RenderContext<'_>,
    ) -> Result<Value, RenderError> {
        let foreign_key =
            association
                .foreign_key
                .as_deref()
                .ok_or_else(|| RenderError::MissingForeignKey {
                    name: self.name.clone(),
                    model: record.model_name().to_string(),
                })?;

        let id = record.get(foreign_key);
        if id.is_null() {
            return Ok(data_value(Value::Null));
        }

        let serializer = match (&self.serializer, &association.target) {
            (SerializerRef::Fixed(target), _) => ctx.resolver.resolve(target)?,
            (_, RelatedTarget::Model(model)) => {
                ctx.resolver.resolve(&ResolveTarget::Model(model.clone()))?
            }
            (_, RelatedTarget::Polymorphic { type_field }) => {
                let discriminator = record.get(type_field);
                let model = discriminator.as_str().ok_or_else(|| {
                    RenderError::MissingDiscriminator {
                        name: self.name.clone(),
                        model: record.model_name().to_string(),
                        field: type_field.clone(),
                        actual: json_type_name(&discriminator).to_string(),
                    }
                })?;
                ctx.resolver.resolve(&ResolveTarget::Model(model.to_string()))?
            }
        };

        Ok(data_value(reference_object(serializer.type_tag(), id, ctx)))
    }

    fn resolve_serializer(
        &self,
        record: &dyn Record,
        ctx: &RenderContext<'_>,
    ) -> Result<Arc<Serializer>, RenderError> {
        let serializer = match &self.serializer {
            SerializerRef::Resolve => ctx.resolver.resolve_record(record)?,
            SerializerRef::Fixed(target) => ctx.resolver.resolve(target)?,
            SerializerRef::Dynamic(f) => ctx.resolver.resolve_dynamic(f, record, ctx.params)?,
        };
        Ok(serializer)
    }

    fn related_one(&self, record: &dyn Record, params: &Params) -> Option<SharedRecord> {
        match &self.accessor {
            RelatedAccessor::Association(name) => record.related_one(name),
            RelatedAccessor::ComputedOne(f) => f(record, params),
            RelatedAccessor::ComputedMany(f) => f(record, params).into_iter().next(),
        }
    }

    fn related_many(&self, record: &dyn Record, params: &Params) -> Vec<SharedRecord> {
        match &self.accessor {
            RelatedAccessor::Association(name) => record.related_many(name),
            RelatedAccessor::ComputedMany(f) => f(record, params),
            RelatedAccessor::ComputedOne(f) => f(record, params).into_iter().collect(),
        }
    }
}

/// `{type, id}` with the configured id transform applied.
fn reference_object(type_tag: &str, id: Value, ctx: &RenderContext<'_>) -> Value {
    let mut map = Map::new();
    map.insert("type".to_string(), Value::String(type_tag.to_string()));
    map.insert("id".to_string(), ctx.config.transform_id(id));
    Value::Object(map)
}

fn data_value(data: Value) -> Value {
    let mut map = Map::new();
    map.insert("data".to_string(), data);
    Value::Object(map)
}

/// Merge the link and data parts; either may be absent.
fn merge_parts(link: Option<Value>, data: Option<Value>) -> Option<Value> {
    match (link, data) {
        (Some(Value::Object(mut link)), Some(Value::Object(data))) => {
            link.extend(data);
            Some(Value::Object(link))
        }
        (Some(link), None) => Some(link),
        (None, Some(data)) => Some(data),
        (None, None) => None,
        // both parts are always objects
        (Some(link), Some(_)) => Some(link),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelGraph;
    use crate::serializer::{Registry, SerializerBuilder};
    use crate::store::tests::simpsons;
    use crate::types::RenderConfig;
    use crate::resolver::Resolver;
    use serde_json::json;

    struct Fixture {
        resolver: Arc<Resolver>,
        graph: Arc<ModelGraph>,
        config: RenderConfig,
        params: Params,
        store: crate::store::MemoryStore,
    }

    impl Fixture {
        fn ctx(&self) -> RenderContext<'_> {
            RenderContext {
                resolver: &self.resolver,
                graph: &self.graph,
                config: &self.config,
                params: &self.params,
            }
        }
    }

    fn fixture() -> Fixture {
        let (graph, store) = simpsons();
        let mut registry = Registry::new();
        registry.register(SerializerBuilder::new("user").attribute("first_name").build());
        registry.register(SerializerBuilder::new("organization").attribute("name").build());
        registry.register(SerializerBuilder::new("post").attribute("title").build());
        registry.register(SerializerBuilder::new("comment").attribute("text").build());
        registry.register(SerializerBuilder::new("job").attribute("title").build());
        let resolver = Arc::new(Resolver::new(Arc::new(registry), graph.clone()));
        Fixture {
            resolver,
            graph,
            config: RenderConfig::new(),
            params: Params::new(),
            store,
        }
    }

    #[test]
    fn belongs_to_derives_reference_from_foreign_key() {
        let fx = fixture();
        let user = fx.store.find("User", &json!(1)).unwrap();
        let rel = Relationship::belongs_to("organization");

        let out = rel.serialize(user.as_ref(), &fx.ctx(), false).unwrap();
        assert_eq!(
            out,
            Some(json!({ "data": { "type": "organization", "id": 7 } }))
        );
    }

    #[test]
    fn belongs_to_null_foreign_key_renders_data_null() {
        let fx = fixture();
        let orphan = fx.store.insert(
            "User",
            json!({ "id": 99, "first_name": "Nobody", "organization_id": null }),
        );

        let rel = Relationship::belongs_to("organization");
        let out = rel.serialize(orphan.as_ref(), &fx.ctx(), false).unwrap();
        assert_eq!(out, Some(json!({ "data": null })));
    }

    #[test]
    fn belongs_to_polymorphic_uses_discriminator() {
        let fx = fixture();
        let note = fx.store.insert(
            "Note",
            json!({ "id": 5, "subject_id": 1, "subject_type": "User" }),
        );

        let rel = Relationship::belongs_to("subject");
        let out = rel.serialize(note.as_ref(), &fx.ctx(), false).unwrap();
        assert_eq!(out, Some(json!({ "data": { "type": "user", "id": 1 } })));
    }

    #[test]
    fn belongs_to_polymorphic_missing_discriminator_errors() {
        let fx = fixture();
        let note = fx
            .store
            .insert("Note", json!({ "id": 6, "subject_id": 1 }));

        let rel = Relationship::belongs_to("subject");
        let result = rel.serialize(note.as_ref(), &fx.ctx(), false);
        assert!(matches!(
            result,
            Err(RenderError::MissingDiscriminator { field, .. }) if field == "subject_type"
        ));
    }

    #[test]
    fn has_one_fetches_the_record() {
        let fx = fixture();
        let user = fx.store.find("User", &json!(1)).unwrap();
        let rel = Relationship::has_one("job");

        let out = rel.serialize(user.as_ref(), &fx.ctx(), false).unwrap();
        assert_eq!(out, Some(json!({ "data": { "type": "job", "id": 42 } })));
    }

    #[test]
    fn to_one_link_suppresses_data_by_default() {
        let fx = fixture();
        let user = fx.store.find("User", &json!(1)).unwrap();
        let rel = Relationship::belongs_to("organization").link("/organizations/7");

        let out = rel.serialize(user.as_ref(), &fx.ctx(), false).unwrap();
        assert_eq!(
            out,
            Some(json!({ "links": { "related": "/organizations/7" } }))
        );
    }

    #[test]
    fn to_one_link_with_force_data_emits_both() {
        let fx = fixture();
        let user = fx.store.find("User", &json!(1)).unwrap();
        let rel = Relationship::belongs_to("organization")
            .link("/organizations/7")
            .force_data(true);

        let out = rel.serialize(user.as_ref(), &fx.ctx(), false).unwrap();
        assert_eq!(
            out,
            Some(json!({
                "links": { "related": "/organizations/7" },
                "data": { "type": "organization", "id": 7 }
            }))
        );
    }

    #[test]
    fn computed_link_null_suppresses_link() {
        let fx = fixture();
        let user = fx.store.find("User", &json!(1)).unwrap();
        let rel = Relationship::belongs_to("organization")
            .link_with(Computed::One(Arc::new(|_| Value::Null)));

        let out = rel.serialize(user.as_ref(), &fx.ctx(), false).unwrap();
        // no link means the reference is emitted instead
        assert_eq!(
            out,
            Some(json!({ "data": { "type": "organization", "id": 7 } }))
        );
    }

    #[test]
    fn has_many_suppressed_by_default() {
        let fx = fixture();
        let user = fx.store.find("User", &json!(1)).unwrap();
        let rel = Relationship::has_many("posts");

        assert!(!rel.enabled(user.as_ref(), &fx.params, false));
        assert!(rel.enabled(user.as_ref(), &fx.params, true));
    }

    #[test]
    fn has_many_included_emits_references_in_order() {
        let fx = fixture();
        let user = fx.store.find("User", &json!(1)).unwrap();
        let rel = Relationship::has_many("posts");

        let out = rel.serialize(user.as_ref(), &fx.ctx(), true).unwrap();
        assert_eq!(
            out,
            Some(json!({ "data": [
                { "type": "post", "id": 10 },
                { "type": "post", "id": 11 },
                { "type": "post", "id": 12 }
            ]}))
        );
    }

    #[test]
    fn has_many_empty_collection_is_empty_array_not_omitted() {
        let fx = fixture();
        let loner = fx.store.insert(
            "User",
            json!({ "id": 2, "first_name": "Maggie", "organization_id": 7 }),
        );
        let rel = Relationship::has_many("posts");

        let out = rel.serialize(loner.as_ref(), &fx.ctx(), true).unwrap();
        assert_eq!(out, Some(json!({ "data": [] })));
    }

    #[test]
    fn has_many_predicate_overrides_everything() {
        let fx = fixture();
        let user = fx.store.find("User", &json!(1)).unwrap();
        let rel = Relationship::has_many("posts")
            .force_data(true)
            .link("/posts")
            .only_if(Predicate::Zero(Arc::new(|| false)));

        assert!(!rel.enabled(user.as_ref(), &fx.params, true));
    }

    #[test]
    fn has_many_link_only_without_inclusion() {
        let fx = fixture();
        let user = fx.store.find("User", &json!(1)).unwrap();
        let rel = Relationship::has_many("posts").link("/users/1/posts");

        assert!(rel.enabled(user.as_ref(), &fx.params, false));
        let out = rel.serialize(user.as_ref(), &fx.ctx(), false).unwrap();
        assert_eq!(
            out,
            Some(json!({ "links": { "related": "/users/1/posts" } }))
        );
    }

    #[test]
    fn serialize_included_deduplicates() {
        let fx = fixture();
        let user = fx.store.find("User", &json!(1)).unwrap();
        let rel = Relationship::has_many("posts");

        let mut set = IncludedSet::new();
        rel.serialize_included(user.as_ref(), &IncludeTree::new(), &fx.ctx(), &mut set)
            .unwrap();
        rel.serialize_included(user.as_ref(), &IncludeTree::new(), &fx.ctx(), &mut set)
            .unwrap();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn serialize_included_recurses_into_children() {
        let fx = fixture();
        let user = fx.store.find("User", &json!(1)).unwrap();
        let rel = Relationship::has_many("posts");
        let children = IncludeTree::from("comments");

        // posts need a comments relationship for the recursion to find
        let mut registry = Registry::new();
        registry.register(SerializerBuilder::new("user").build());
        registry.register(
            SerializerBuilder::new("post")
                .relationship(Relationship::has_many("comments"))
                .build(),
        );
        registry.register(SerializerBuilder::new("comment").build());
        let resolver = Arc::new(Resolver::new(Arc::new(registry), fx.graph.clone()));
        let ctx = RenderContext {
            resolver: &resolver,
            graph: &fx.graph,
            config: &fx.config,
            params: &fx.params,
        };

        let mut set = IncludedSet::new();
        rel.serialize_included(user.as_ref(), &children, &ctx, &mut set)
            .unwrap();
        // 3 posts + 2 comments each
        assert_eq!(set.len(), 9);
    }

    #[test]
    fn computed_accessor_forces_record_fetch() {
        let fx = fixture();
        let user = fx.store.find("User", &json!(1)).unwrap();
        let org = fx.store.find("Organization", &json!(7)).unwrap();
        let rel = Relationship::belongs_to("organization")
            .computed_one(Arc::new(move |_, _| Some(org.clone())));

        let out = rel.serialize(user.as_ref(), &fx.ctx(), false).unwrap();
        assert_eq!(
            out,
            Some(json!({ "data": { "type": "organization", "id": 7 } }))
        );
    }

    #[test]
    fn fixed_serializer_overrides_resolution() {
        let fx = fixture();
        let user = fx.store.find("User", &json!(1)).unwrap();
        let rel = Relationship::belongs_to("organization").serializer("organization");

        let out = rel.serialize(user.as_ref(), &fx.ctx(), false).unwrap();
        assert_eq!(
            out,
            Some(json!({ "data": { "type": "organization", "id": 7 } }))
        );
    }

    #[test]
    fn dynamic_serializer_is_chosen_per_record_and_fetches() {
        let fx = fixture();
        fx.store.insert(
            "Organization",
            json!({ "id": 8, "name": "Moe's Tavern", "premium": true }),
        );
        let homer = fx.store.find("User", &json!(1)).unwrap();
        let moe = fx.store.insert(
            "User",
            json!({ "id": 3, "first_name": "Moe", "organization_id": 8 }),
        );

        let mut registry = Registry::new();
        registry.register(SerializerBuilder::new("organization").build());
        registry.register(
            SerializerBuilder::new("premium_organization")
                .id_field("name")
                .build(),
        );
        let resolver = Arc::new(Resolver::new(Arc::new(registry), fx.graph.clone()));
        let ctx = RenderContext {
            resolver: &resolver,
            graph: &fx.graph,
            config: &fx.config,
            params: &fx.params,
        };

        let rel = Relationship::belongs_to("organization").serializer_with(Arc::new(
            |related, _| {
                if related.get("premium") == json!(true) {
                    ResolveTarget::from("premium_organization")
                } else {
                    ResolveTarget::from("organization")
                }
            },
        ));

        let out = rel.serialize(homer.as_ref(), &ctx, false).unwrap();
        assert_eq!(
            out,
            Some(json!({ "data": { "type": "organization", "id": 7 } }))
        );

        // the chosen definition reads its id off the fetched record, which
        // the foreign key alone could not supply
        let out = rel.serialize(moe.as_ref(), &ctx, false).unwrap();
        assert_eq!(
            out,
            Some(json!({ "data": { "type": "premium_organization", "id": "Moe's Tavern" } }))
        );
    }

    #[test]
    fn force_data_predicate_gates_data_emission() {
        let fx = fixture();
        let user = fx.store.find("User", &json!(1)).unwrap();
        let rel = Relationship::has_many("posts").force_data_when(Predicate::Two(Arc::new(
            |_, p| p.get("expand").and_then(Value::as_bool).unwrap_or(false),
        )));

        assert!(!rel.enabled(user.as_ref(), &fx.params, false));
        let out = rel.serialize(user.as_ref(), &fx.ctx(), false).unwrap();
        assert_eq!(out, None);

        let mut params = Params::new();
        params.insert("expand".into(), json!(true));
        let ctx = RenderContext {
            resolver: &fx.resolver,
            graph: &fx.graph,
            config: &fx.config,
            params: &params,
        };
        assert!(rel.enabled(user.as_ref(), &params, false));
        let out = rel.serialize(user.as_ref(), &ctx, false).unwrap();
        assert_eq!(
            out,
            Some(json!({ "data": [
                { "type": "post", "id": 10 },
                { "type": "post", "id": 11 },
                { "type": "post", "id": 12 }
            ]}))
        );
    }
}
