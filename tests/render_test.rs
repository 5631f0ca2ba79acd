//! Integration tests for document rendering.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jsonapi_render::{
    build_document, Association, DataLoader, DocumentParts, Failure, IncludeTree, MemoryStore,
    ModelGraph, ModelType, NoopLoader, Record, Registry, Relationship, RenderConfig, RenderError,
    RenderOptions, Renderer, SerializerBuilder, SharedRecord, Violation,
};
use serde_json::{json, Value};

fn graph() -> Arc<ModelGraph> {
    let mut graph = ModelGraph::new();
    graph.register(
        ModelType::new("User")
            .association(
                "organization",
                Association::belongs_to("organization_id", "Organization"),
            )
            .association("posts", Association::has_many("Post", "user_id"))
            .association("job", Association::has_one("Job", "user_id")),
    );
    graph.register(ModelType::new("Admin").parent("User"));
    graph.register(ModelType::new("Organization"));
    graph.register(
        ModelType::new("Post")
            .association("user", Association::belongs_to("user_id", "User"))
            .association("comments", Association::has_many("Comment", "post_id")),
    );
    graph.register(
        ModelType::new("Comment")
            .association("post", Association::belongs_to("post_id", "Post")),
    );
    graph.register(ModelType::new("Job"));
    Arc::new(graph)
}

fn registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    registry.register(
        SerializerBuilder::new("user")
            .attributes(["first_name", "last_name"])
            .relationship(Relationship::belongs_to("organization"))
            .relationship(Relationship::has_many("posts"))
            .build(),
    );
    registry.register(SerializerBuilder::new("organization").attribute("name").build());
    registry.register(
        SerializerBuilder::new("post")
            .attribute("title")
            .relationship(Relationship::has_many("comments"))
            .build(),
    );
    registry.register(SerializerBuilder::new("comment").attribute("text").build());
    Arc::new(registry)
}

fn store(graph: &Arc<ModelGraph>) -> MemoryStore {
    let store = MemoryStore::new(graph.clone());
    store.insert("Organization", json!({ "id": 7, "name": "Springfield Power" }));
    store.insert(
        "User",
        json!({
            "id": 1,
            "first_name": "Homer",
            "last_name": "Simpson",
            "organization_id": 7
        }),
    );
    for post_id in [10, 11, 12] {
        store.insert(
            "Post",
            json!({ "id": post_id, "user_id": 1, "title": format!("post {post_id}") }),
        );
        for offset in [0, 1] {
            store.insert(
                "Comment",
                json!({ "id": post_id * 10 + offset, "post_id": post_id, "text": "d'oh" }),
            );
        }
    }
    store
}

fn renderer() -> (Renderer, MemoryStore) {
    let graph = graph();
    let store = store(&graph);
    (Renderer::new(registry(), graph), store)
}

mod single_resource {
    use super::*;

    #[test]
    fn renders_type_id_attributes_and_references() {
        let (renderer, store) = renderer();
        let user = store.find("User", &json!(1)).unwrap();

        let doc = renderer.render_record(&user, &RenderOptions::new()).unwrap();
        assert_eq!(doc["data"]["type"], json!("user"));
        assert_eq!(doc["data"]["id"], json!(1));
        assert_eq!(doc["data"]["attributes"]["first_name"], json!("Homer"));
        // belongs_to emits a reference even without inclusion
        assert_eq!(
            doc["data"]["relationships"]["organization"],
            json!({ "data": { "type": "organization", "id": 7 } })
        );
        // has_many is suppressed without inclusion
        assert!(doc["data"]["relationships"].get("posts").is_none());
        assert!(doc.get("included").is_none());
    }

    #[test]
    fn key_and_id_transforms_apply_everywhere() {
        let graph = graph();
        let store = store(&graph);
        let user = store.find("User", &json!(1)).unwrap();
        let config = RenderConfig::new()
            .key_transform(|k| k.to_uppercase())
            .id_transform(|id| Value::String(id.to_string()));
        let renderer = Renderer::new(registry(), graph).config(config);

        let doc = renderer.render_record(&user, &RenderOptions::new()).unwrap();
        assert_eq!(doc["data"]["id"], json!("1"));
        assert_eq!(doc["data"]["attributes"]["FIRST_NAME"], json!("Homer"));
        assert_eq!(
            doc["data"]["relationships"]["ORGANIZATION"]["data"]["id"],
            json!("7")
        );
    }

    #[test]
    fn explicit_serializer_overrides_resolution() {
        let (renderer, store) = renderer();
        let user = store.find("User", &json!(1)).unwrap();
        let sparse = SerializerBuilder::new("person").attribute("first_name").build();

        let doc = renderer
            .render_record(&user, &RenderOptions::new().serializer(sparse))
            .unwrap();
        assert_eq!(doc["data"]["type"], json!("person"));
        assert!(doc["data"].get("relationships").is_none());
    }

    #[test]
    fn meta_and_links_pass_through() {
        let (renderer, store) = renderer();
        let user = store.find("User", &json!(1)).unwrap();

        let doc = renderer
            .render_record(
                &user,
                &RenderOptions::new()
                    .meta(json!({ "generated": true }))
                    .links(json!({ "self": "/users/1" })),
            )
            .unwrap();
        assert_eq!(doc["meta"], json!({ "generated": true }));
        assert_eq!(doc["links"], json!({ "self": "/users/1" }));
    }
}

mod included_section {
    use super::*;

    #[test]
    fn deep_include_collects_every_level() {
        let (renderer, store) = renderer();
        let user = store.find("User", &json!(1)).unwrap();
        let include = IncludeTree::parse("organization,posts.comments").unwrap();

        let doc = renderer
            .render_record(&user, &RenderOptions::new().include(include))
            .unwrap();
        // 1 organization + 3 posts + 6 comments
        let included = doc["included"].as_array().unwrap();
        assert_eq!(included.len(), 10);
        assert_eq!(
            doc["data"]["relationships"]["posts"]["data"]
                .as_array()
                .unwrap()
                .len(),
            3
        );
        // every included entry is a full resource object
        for entry in included {
            assert!(entry.get("type").is_some());
            assert!(entry.get("id").is_some());
        }
    }

    #[test]
    fn rendering_is_deterministic() {
        let (renderer, store) = renderer();
        let user = store.find("User", &json!(1)).unwrap();
        let opts = RenderOptions::new()
            .include(IncludeTree::parse("organization,posts.comments").unwrap());

        let first = renderer.render_record(&user, &opts).unwrap();
        let second = renderer.render_record(&user, &opts).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn unknown_include_name_is_an_error() {
        let (renderer, store) = renderer();
        let user = store.find("User", &json!(1)).unwrap();
        let opts = RenderOptions::new().include(IncludeTree::from("favorites"));

        let result = renderer.render_record(&user, &opts);
        assert!(matches!(
            result,
            Err(RenderError::UnknownRelationship { name, .. }) if name == "favorites"
        ));
    }

    #[test]
    fn nested_duplicates_appear_once() {
        let graph = graph();
        let store = store(&graph);
        // both posts and comments point back at the same user
        let mut registry = Registry::new();
        registry.register(
            SerializerBuilder::new("user")
                .relationship(Relationship::has_many("posts"))
                .build(),
        );
        registry.register(
            SerializerBuilder::new("post")
                .relationship(Relationship::belongs_to("user"))
                .build(),
        );
        let renderer = Renderer::new(Arc::new(registry), graph);
        let user = store.find("User", &json!(1)).unwrap();
        let opts = RenderOptions::new()
            .include(IncludeTree::parse("posts.user").unwrap());

        let doc = renderer.render_record(&user, &opts).unwrap();
        let included = doc["included"].as_array().unwrap();
        // 3 posts + the one shared user
        assert_eq!(included.len(), 4);
        let users = included
            .iter()
            .filter(|entry| entry["type"] == json!("user"))
            .count();
        assert_eq!(users, 1);
    }
}

mod collections {
    use super::*;

    #[test]
    fn empty_collection_is_an_empty_data_array() {
        let (renderer, _store) = renderer();
        let doc = renderer.render_records(&[], &RenderOptions::new()).unwrap();
        assert_eq!(doc, json!({ "data": [] }));
    }

    #[test]
    fn included_is_shared_across_roots() {
        let (renderer, store) = renderer();
        let posts = store.all("Post");
        let opts = RenderOptions::new().include(IncludeTree::from("comments"));

        let doc = renderer.render_records(&posts, &opts).unwrap();
        assert_eq!(doc["data"].as_array().unwrap().len(), 3);
        // 6 comments total, no duplicates
        assert_eq!(doc["included"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn serializer_resolves_per_record_through_parents() {
        let graph = graph();
        let store = store(&graph);
        store.insert(
            "Admin",
            json!({ "id": 2, "first_name": "Monty", "last_name": "Burns", "organization_id": 7 }),
        );
        let renderer = Renderer::new(registry(), graph);
        let records: Vec<SharedRecord> = vec![
            store.find("User", &json!(1)).unwrap(),
            store.find("Admin", &json!(2)).unwrap(),
        ];

        let doc = renderer.render_records(&records, &RenderOptions::new()).unwrap();
        let data = doc["data"].as_array().unwrap();
        // Admin has no serializer of its own and falls back to its parent's
        assert_eq!(data[0]["type"], json!("user"));
        assert_eq!(data[1]["type"], json!("user"));
        assert_eq!(data[1]["attributes"]["last_name"], json!("Burns"));
    }
}

mod fetch_behavior {
    use super::*;

    /// Counts association fetches so tests can assert what was never read.
    struct CountingRecord {
        inner: SharedRecord,
        fetches: Arc<AtomicUsize>,
    }

    impl Record for CountingRecord {
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }
        fn id(&self) -> Value {
            self.inner.id()
        }
        fn get(&self, field: &str) -> Value {
            self.inner.get(field)
        }
        fn related_one(&self, name: &str) -> Option<SharedRecord> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.related_one(name)
        }
        fn related_many(&self, name: &str) -> Vec<SharedRecord> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.related_many(name)
        }
    }

    #[test]
    fn belongs_to_reference_never_fetches() {
        let (renderer, store) = renderer();
        let fetches = Arc::new(AtomicUsize::new(0));
        let user: SharedRecord = Arc::new(CountingRecord {
            inner: store.find("User", &json!(1)).unwrap(),
            fetches: fetches.clone(),
        });

        let doc = renderer.render_record(&user, &RenderOptions::new()).unwrap();
        assert_eq!(
            doc["data"]["relationships"]["organization"]["data"]["id"],
            json!(7)
        );
        // the reference came from the foreign key alone
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn inclusion_fetches_the_related_records() {
        let (renderer, store) = renderer();
        let fetches = Arc::new(AtomicUsize::new(0));
        let user: SharedRecord = Arc::new(CountingRecord {
            inner: store.find("User", &json!(1)).unwrap(),
            fetches: fetches.clone(),
        });
        let opts = RenderOptions::new().include(IncludeTree::from("organization"));

        let doc = renderer.render_record(&user, &opts).unwrap();
        assert_eq!(doc["included"].as_array().unwrap().len(), 1);
        assert!(fetches.load(Ordering::SeqCst) > 0);
    }
}

mod eager_loading {
    use super::*;

    struct CapturingLoader {
        calls: Arc<AtomicUsize>,
        last_plan: std::sync::Mutex<Option<String>>,
    }

    impl DataLoader for CapturingLoader {
        fn load(&self, _records: &[SharedRecord], plan: &IncludeTree) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_plan.lock().unwrap() = Some(plan.cache_key());
        }
    }

    #[test]
    fn loader_runs_once_per_render_with_the_full_plan() {
        let graph = graph();
        let store = store(&graph);
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = Arc::new(CapturingLoader {
            calls: calls.clone(),
            last_plan: std::sync::Mutex::new(None),
        });
        let renderer = Renderer::new(registry(), graph).loader(loader.clone());
        let posts = store.all("Post");
        let opts = RenderOptions::new().include(IncludeTree::from("comments"));

        renderer.render_records(&posts, &opts).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let plan = loader.last_plan.lock().unwrap().clone().unwrap();
        assert_eq!(plan, "comments");
    }

    #[test]
    fn noop_loader_changes_nothing() {
        let graph = graph();
        let store = store(&graph);
        let renderer = Renderer::new(registry(), graph).loader(Arc::new(NoopLoader));
        let user = store.find("User", &json!(1)).unwrap();

        let doc = renderer.render_record(&user, &RenderOptions::new()).unwrap();
        assert_eq!(doc["data"]["id"], json!(1));
    }
}

mod document_contract {
    use super::*;

    #[test]
    fn data_and_errors_cannot_coexist() {
        let result = build_document(DocumentParts {
            data: Some(json!({})),
            errors: Some(vec![json!({ "detail": "boom" })]),
            ..Default::default()
        });
        assert!(matches!(result, Err(RenderError::DataWithErrors)));
    }

    #[test]
    fn not_found_failure() {
        let (renderer, _store) = renderer();
        let doc = renderer.render_failure(&Failure::NotFound);
        assert_eq!(
            doc,
            json!({
                "errors": [{
                    "status": 404,
                    "title": "Not Found",
                    "detail": "The specified resource does not exist"
                }]
            })
        );
    }

    #[test]
    fn validation_failure_emits_one_entry_per_violation() {
        let (renderer, _store) = renderer();
        let doc = renderer.render_failure(&Failure::Invalid {
            violations: vec![
                Violation::new("first_name", "can't be blank"),
                Violation::new("email", "is invalid"),
            ],
        });
        let errors = doc["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0]["status"], json!(422));
        assert_eq!(
            errors[1]["source"]["pointer"],
            json!("/data/attributes/email")
        );
    }

    #[test]
    fn generic_failure_is_a_bare_detail() {
        let (renderer, _store) = renderer();
        let doc = renderer.render_failure(&Failure::Message("upstream timeout".into()));
        assert_eq!(doc, json!({ "errors": [{ "detail": "upstream timeout" }] }));
    }
}

mod include_normalization {
    use super::*;

    #[test]
    fn query_syntax_and_value_shapes_agree() {
        let parsed = IncludeTree::parse("organization,posts.comments").unwrap();
        let from_value = IncludeTree::from_value(&json!([
            "organization",
            { "posts": "comments" }
        ]))
        .unwrap();
        assert_eq!(parsed, from_value);
    }

    #[test]
    fn malformed_value_is_rejected() {
        assert!(IncludeTree::from_value(&json!(42)).is_err());
        assert!(IncludeTree::parse("posts..comments").is_err());
    }
}
