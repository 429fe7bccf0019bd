use serde_json::{json, Value};
use std::sync::Arc;

use stardust_rust::logic::validate::Payload;
use stardust_rust::{
    Condition, EngineError, EntryService, EntrySearchCriteria, FilterOp, Id, LifecycleManager,
    MemoryStore, ModelService, ModelStore, QueryParser, SearchCriteria, SortKey, UpdateOutcome,
};

const ACTOR: i64 = 42;

struct Engine {
    store: Arc<MemoryStore>,
    models: ModelService<MemoryStore>,
    entries: EntryService<MemoryStore>,
}

impl Engine {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            models: ModelService::new(Arc::clone(&store)),
            entries: EntryService::new(Arc::clone(&store)),
            store,
        }
    }

    async fn model(&self, name: &str) -> Id {
        self.models
            .create(&payload(json!({"name": name, "fields": default_fields()})), ACTOR)
            .await
            .unwrap()
    }

    async fn entry(&self, model_id: Id, name: &str, data: Value) -> Id {
        self.entries
            .create(
                &payload(json!({"model_id": model_id, "name": name, "fields": data})),
                ACTOR,
            )
            .await
            .unwrap()
    }
}

fn payload(value: Value) -> Payload {
    value.as_object().cloned().unwrap()
}

fn default_fields() -> Value {
    json!([
        {"id": "title", "type": "text", "label": "Title", "required": true},
        {"id": "price", "type": "number"}
    ])
}

fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
    raw.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Walk every page and collect ids
async fn all_pages(engine: &Engine, criteria: &SearchCriteria, limit: u32) -> Vec<Id> {
    let mut ids = Vec::new();
    let mut page = 1;
    loop {
        let batch = engine.models.paginate(page, limit, criteria).await.unwrap();
        if batch.is_empty() {
            break;
        }
        ids.extend(batch.iter().map(|m| m.id));
        page += 1;
    }
    ids
}

#[tokio::test]
async fn test_created_model_exposes_input_schema() {
    let engine = Engine::new();
    let fields = json!([
        {"id": "f1", "type": "text", "label": "Headline", "required": true},
        {"id": "f2", "type": "boolean"},
        {"id": "f3", "type": "url", "label": "Homepage"}
    ]);
    let id = engine
        .models
        .create(&payload(json!({"name": "Articles", "fields": fields.clone()})), ACTOR)
        .await
        .unwrap();

    let model = engine.models.find(id).await.unwrap();
    assert_eq!(model.name, "Articles");
    assert_eq!(model.slug, "articles");
    assert_eq!(serde_json::to_value(&model.fields).unwrap(), fields);
}

#[tokio::test]
async fn test_fields_without_id_or_type_are_rejected_without_mutation() {
    let engine = Engine::new();
    let missing_type = json!({"name": "Broken", "fields": [{"id": "a"}]});
    let missing_id = json!({"name": "Broken", "fields": [{"type": "text"}]});

    for body in [missing_type, missing_id] {
        let err = engine.models.create(&payload(body), ACTOR).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
    assert_eq!(engine.models.count(&SearchCriteria::new()).await.unwrap(), 0);

    let id = engine.model("Stable").await;
    let before = engine.models.find(id).await.unwrap();
    let err = engine
        .models
        .update(id, &payload(json!({"fields": [{"id": "x"}]})), ACTOR)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let after = engine.models.find(id).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(engine.models.history(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_schema_update_appends_one_snapshot_and_keeps_the_old_one() {
    let engine = Engine::new();
    let id = engine.model("Products").await;
    let original = engine.models.find(id).await.unwrap();

    let outcome = engine
        .models
        .update(
            id,
            &payload(json!({"fields": [{"id": "sku", "type": "text"}]})),
            ACTOR,
        )
        .await
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::Updated);

    let updated = engine.models.find(id).await.unwrap();
    assert_ne!(updated.current_schema_id, original.current_schema_id);
    assert_eq!(updated.fields.len(), 1);

    let history = engine.models.history(id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].id, updated.current_schema_id);

    let old = engine.models.snapshot(original.current_schema_id).await.unwrap();
    assert_eq!(old.fields, original.fields);
}

#[tokio::test]
async fn test_text_query_count_agrees_with_page() {
    let engine = Engine::new();
    for name in ["Apple", "Banana", "Cherry"] {
        engine.model(name).await;
    }

    let criteria = SearchCriteria::new().search("Apple");
    assert_eq!(engine.models.count(&criteria).await.unwrap(), 1);

    let page = engine.models.paginate(1, 20, &criteria).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].name, "Apple");
}

#[tokio::test]
async fn test_pages_cover_exactly_count() {
    let engine = Engine::new();
    for i in 0..23 {
        let name = if i % 3 == 0 {
            format!("Report {}", i)
        } else {
            format!("Memo {}", i)
        };
        engine.model(&name).await;
    }

    let criterias = [
        SearchCriteria::new(),
        SearchCriteria::new().search("report"),
        SearchCriteria::new().sort_by(vec![SortKey::asc("name")]),
        SearchCriteria::new()
            .with_custom_filter("name", Condition::new(FilterOp::Gt, "Memo 5")),
    ];

    for criteria in &criterias {
        let total = engine.models.count(criteria).await.unwrap();
        let ids = all_pages(&engine, criteria, 4).await;
        assert_eq!(ids.len() as u64, total, "criteria {:?}", criteria);

        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), ids.len(), "pages overlap for {:?}", criteria);
    }
}

#[tokio::test]
async fn test_ids_and_query_intersect() {
    let engine = Engine::new();
    let apple = engine.model("Apple").await;
    let apricot = engine.model("Apricot").await;
    let banana = engine.model("Banana").await;

    let criteria = SearchCriteria::new()
        .with_ids([apple, banana])
        .search("Ap");
    let page = engine.models.paginate(1, 20, &criteria).await.unwrap();
    let ids: Vec<Id> = page.iter().map(|m| m.id).collect();

    assert_eq!(ids, vec![apple]);
    assert!(!ids.contains(&apricot));
    assert_eq!(engine.models.count(&criteria).await.unwrap(), 1);
}

#[test]
fn test_limit_clamps() {
    let parser = QueryParser::default();
    assert_eq!(parser.parse(&pairs(&[("limit", "150")])).unwrap().limit, 100);
    assert_eq!(parser.parse(&pairs(&[("limit", "0")])).unwrap().limit, 20);
    assert_eq!(parser.parse(&pairs(&[("limit", "-5")])).unwrap().limit, 20);
    assert_eq!(parser.parse(&pairs(&[("limit", "35")])).unwrap().limit, 35);
}

#[tokio::test]
async fn test_clamped_limit_bounds_page_size() {
    let engine = Engine::new();
    for i in 0..105 {
        engine.model(&format!("Bulk {}", i)).await;
    }

    let spec = QueryParser::default()
        .parse(&pairs(&[("limit", "150")]))
        .unwrap();
    let criteria = SearchCriteria::from_query(&spec).unwrap();
    let page = engine
        .models
        .paginate(spec.page, spec.limit, &criteria)
        .await
        .unwrap();
    assert_eq!(page.len(), 100);
}

#[tokio::test]
async fn test_soft_delete_is_idempotent_and_purge_removes_everything() {
    let engine = Engine::new();
    let id = engine.model("Disposable").await;
    let snapshot_id = engine.models.find(id).await.unwrap().current_schema_id;

    assert_eq!(engine.models.delete_models(&[id], ACTOR).await.unwrap(), 1);
    assert_eq!(engine.models.delete_models(&[id], ACTOR).await.unwrap(), 0);
    assert!(engine.models.find(id).await.unwrap_err().is_not_found());

    let tombstone = engine.store.get_model(id, true).await.unwrap().unwrap();
    assert!(tombstone.is_deleted());

    assert_eq!(engine.models.purge_models(&[id]).await.unwrap(), 1);
    assert!(engine.store.get_model(id, true).await.unwrap().is_none());
    assert!(engine.models.snapshot(snapshot_id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_purge_leaves_bystanders_alone() {
    let engine = Engine::new();
    let doomed = engine.model("Doomed").await;
    let bystander = engine.model("Bystander").await;

    let doomed_entry = engine.entry(doomed, "gone", json!({"title": "a"})).await;
    let kept_entry = engine.entry(bystander, "kept", json!({"title": "b"})).await;
    let bystander_schema = engine.models.find(bystander).await.unwrap().current_schema_id;

    let report = LifecycleManager::new(Arc::clone(&engine.store))
        .delete_and_purge_models(&[doomed], ACTOR)
        .await;
    assert!(report.is_clean());
    assert_eq!(report.purged, 1);

    assert!(engine.entries.find(doomed_entry).await.unwrap_err().is_not_found());
    assert_eq!(engine.entries.find(kept_entry).await.unwrap().name, "kept");
    assert_eq!(engine.models.find(bystander).await.unwrap().name, "Bystander");
    assert!(engine.models.snapshot(bystander_schema).await.is_ok());

    let remaining = engine
        .entries
        .count(&EntrySearchCriteria::default())
        .await
        .unwrap();
    assert_eq!(remaining, 1);
}

#[tokio::test]
async fn test_empty_update_keeps_updated_at() {
    let engine = Engine::new();
    let model_id = engine.model("Untouched").await;
    let entry_id = engine.entry(model_id, "first", json!({"title": "x"})).await;

    let model_before = engine.models.find(model_id).await.unwrap();
    let outcome = engine
        .models
        .update(model_id, &Payload::new(), ACTOR)
        .await
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::NoChanges);
    let model_after = engine.models.find(model_id).await.unwrap();
    assert_eq!(model_before.updated_at, model_after.updated_at);

    let entry_before = engine.entries.find(entry_id).await.unwrap();
    let outcome = engine
        .entries
        .update(entry_id, &Payload::new(), ACTOR)
        .await
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::NoChanges);
    assert_eq!(
        engine.entries.find(entry_id).await.unwrap().updated_at,
        entry_before.updated_at
    );
}

#[tokio::test]
async fn test_entry_filters_on_data_and_model() {
    let engine = Engine::new();
    let books = engine.model("Books").await;
    let games = engine.model("Games").await;

    engine.entry(books, "cheap", json!({"title": "Dune", "price": 9})).await;
    engine.entry(books, "pricey", json!({"title": "Atlas", "price": 120})).await;
    engine.entry(games, "game", json!({"title": "Chess", "price": 30})).await;

    let in_books = EntrySearchCriteria::default().for_model(books);
    assert_eq!(engine.entries.count(&in_books).await.unwrap(), 2);

    let expensive = EntrySearchCriteria::new(
        SearchCriteria::new().with_custom_filter("price", Condition::new(FilterOp::Gt, "20")),
    );
    let page = engine.entries.paginate(1, 20, &expensive).await.unwrap();
    let mut names: Vec<&str> = page.iter().map(|e| e.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["game", "pricey"]);
    assert_eq!(engine.entries.count(&expensive).await.unwrap(), 2);

    let dune = EntrySearchCriteria::new(SearchCriteria::new().search("dune"));
    assert_eq!(engine.entries.count(&dune).await.unwrap(), 1);
}

#[tokio::test]
async fn test_purge_by_creator_sweeps_only_that_creator() {
    let engine = Engine::new();
    for i in 0..5 {
        engine.model(&format!("Mine {}", i)).await;
    }
    let other = engine
        .models
        .create(
            &payload(json!({"name": "Theirs", "fields": default_fields()})),
            ACTOR + 1,
        )
        .await
        .unwrap();

    let report = LifecycleManager::new(Arc::clone(&engine.store))
        .with_chunk_size(2)
        .purge_models_by_creator(ACTOR, ACTOR)
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.purged, 5);
    assert_eq!(report.chunks, 3);
    assert_eq!(engine.models.count(&SearchCriteria::new()).await.unwrap(), 1);
    assert_eq!(engine.models.find(other).await.unwrap().name, "Theirs");
}

#[tokio::test]
async fn test_purge_hard_deletes_live_model() {
    let engine = Engine::new();
    let id = engine
        .models
        .create(
            &payload(json!({"name": "Safe Model", "fields": [{"id": "f1", "type": "text"}]})),
            999,
        )
        .await
        .unwrap();
    let entry = engine
        .entries
        .create(&payload(json!({"model_id": id, "name": "only", "fields": {"f1": "x"}})), 999)
        .await
        .unwrap();

    assert_eq!(engine.models.purge_models(&[id]).await.unwrap(), 1);
    assert!(engine.store.get_model(id, true).await.unwrap().is_none());
    assert!(engine.entries.find(entry).await.unwrap_err().is_not_found());
    assert!(engine.models.history(id).await.unwrap_err().is_not_found());
}
