use chrono::Utc;
use itertools::Itertools;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::logic::record_filter::{check_criteria, RecordFilter, ENTRY_COLUMNS, MODEL_COLUMNS};
use crate::model::{
    slug_candidate, slugify, ActorId, Entry, EntryChanges, EntrySearchCriteria, Id, Model,
    ModelChanges, NewEntry, NewModel, Pagination, SchemaSnapshot, SearchCriteria,
};
use crate::store::traits::{EntryStore, ModelStore};

#[derive(Debug, Default)]
struct Tables {
    models: BTreeMap<Id, Model>,
    snapshots: BTreeMap<Id, SchemaSnapshot>,
    entries: BTreeMap<Id, Entry>,
    next_model_id: Id,
    next_snapshot_id: Id,
    next_entry_id: Id,
}

impl Tables {
    fn next_id(counter: &mut Id) -> Id {
        *counter += 1;
        *counter
    }

    fn slug_taken(&self, slug: &str, except: Option<Id>) -> bool {
        self.models
            .values()
            .any(|model| model.slug == slug && Some(model.id) != except)
    }

    fn unique_slug(&self, base: &str) -> String {
        let mut attempt = 1;
        loop {
            let candidate = slug_candidate(base, attempt);
            if !self.slug_taken(&candidate, None) {
                return candidate;
            }
            attempt += 1;
        }
    }

    fn live_model(&self, id: Id) -> Option<&Model> {
        self.models.get(&id).filter(|model| !model.is_deleted())
    }

    /// Shared by `count_models` and `list_models`
    fn matching_models(&self, criteria: &SearchCriteria) -> Vec<&Model> {
        self.models
            .values()
            .filter(|model| !model.is_deleted())
            .filter(|model| RecordFilter::matches(*model, criteria, &MODEL_COLUMNS))
            .collect()
    }

    /// Shared by `count_entries` and `list_entries`
    fn matching_entries(&self, criteria: &EntrySearchCriteria) -> Vec<&Entry> {
        self.entries
            .values()
            .filter(|entry| !entry.is_deleted())
            .filter(|entry| RecordFilter::matches_entry(entry, criteria))
            .collect()
    }
}

/// In-process store. Every mutation runs under a single write lock, which
/// makes it atomic with respect to readers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page_of<T: Clone>(records: Vec<T>, page: Pagination) -> Vec<T> {
    records
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect()
}

#[async_trait::async_trait]
impl ModelStore for MemoryStore {
    async fn count_models(&self, criteria: &SearchCriteria) -> Result<u64> {
        check_criteria(criteria, &MODEL_COLUMNS)?;
        let tables = self.tables.read();
        Ok(tables.matching_models(criteria).len() as u64)
    }

    async fn list_models(&self, page: Pagination, criteria: &SearchCriteria) -> Result<Vec<Model>> {
        check_criteria(criteria, &MODEL_COLUMNS)?;
        let tables = self.tables.read();
        let mut models: Vec<Model> = tables.matching_models(criteria).into_iter().cloned().collect();
        RecordFilter::sort(&mut models, criteria.sort());
        Ok(page_of(models, page))
    }

    async fn get_model(&self, id: Id, include_deleted: bool) -> Result<Option<Model>> {
        let tables = self.tables.read();
        Ok(tables
            .models
            .get(&id)
            .filter(|model| include_deleted || !model.is_deleted())
            .cloned())
    }

    async fn insert_model(&self, model: NewModel, actor: ActorId) -> Result<Id> {
        let mut tables = self.tables.write();

        let slug = match model.slug {
            Some(slug) if tables.slug_taken(&slug, None) => {
                return Err(EngineError::Conflict(format!("slug '{}' is already taken", slug)))
            }
            Some(slug) => slug,
            None => tables.unique_slug(&slugify(&model.name)),
        };

        let now = Utc::now();
        let model_id = Tables::next_id(&mut tables.next_model_id);
        let snapshot_id = Tables::next_id(&mut tables.next_snapshot_id);

        tables.snapshots.insert(
            snapshot_id,
            SchemaSnapshot {
                id: snapshot_id,
                model_id,
                fields: model.fields.clone(),
                creator_id: actor,
                created_at: now,
            },
        );
        tables.models.insert(
            model_id,
            Model {
                id: model_id,
                name: model.name,
                slug,
                creator_id: actor,
                current_schema_id: snapshot_id,
                fields: model.fields,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
        );

        Ok(model_id)
    }

    async fn update_model(&self, id: Id, changes: ModelChanges, actor: ActorId) -> Result<bool> {
        let mut tables = self.tables.write();
        if tables.live_model(id).is_none() {
            return Ok(false);
        }
        if let Some(slug) = &changes.slug {
            if tables.slug_taken(slug, Some(id)) {
                return Err(EngineError::Conflict(format!("slug '{}' is already taken", slug)));
            }
        }

        let now = Utc::now();
        let snapshot = match changes.fields {
            Some(fields) => {
                let snapshot_id = Tables::next_id(&mut tables.next_snapshot_id);
                let snapshot = SchemaSnapshot {
                    id: snapshot_id,
                    model_id: id,
                    fields,
                    creator_id: actor,
                    created_at: now,
                };
                tables.snapshots.insert(snapshot_id, snapshot.clone());
                Some(snapshot)
            }
            None => None,
        };

        let Some(model) = tables.models.get_mut(&id) else {
            return Ok(false);
        };
        if let Some(name) = changes.name {
            model.name = name;
        }
        if let Some(slug) = changes.slug {
            model.slug = slug;
        }
        if let Some(snapshot) = snapshot {
            model.current_schema_id = snapshot.id;
            model.fields = snapshot.fields;
        }
        model.updated_at = now;

        Ok(true)
    }

    async fn soft_delete_models(&self, ids: &[Id], _actor: ActorId) -> Result<u64> {
        let mut tables = self.tables.write();
        let now = Utc::now();
        let mut deleted = 0;

        for id in ids {
            match tables.models.get_mut(id) {
                Some(model) if !model.is_deleted() => {
                    model.deleted_at = Some(now);
                    model.updated_at = now;
                    deleted += 1;
                }
                _ => {}
            }
        }

        for entry in tables.entries.values_mut() {
            if ids.contains(&entry.model_id) && !entry.is_deleted() {
                entry.deleted_at = Some(now);
                entry.updated_at = now;
            }
        }

        Ok(deleted)
    }

    async fn purge_models(&self, ids: &[Id]) -> Result<u64> {
        let mut tables = self.tables.write();
        let purgeable: Vec<Id> = ids
            .iter()
            .copied()
            .filter(|id| tables.models.contains_key(id))
            .unique()
            .collect();

        tables.entries.retain(|_, entry| !purgeable.contains(&entry.model_id));
        tables.snapshots.retain(|_, snapshot| !purgeable.contains(&snapshot.model_id));
        for id in &purgeable {
            tables.models.remove(id);
        }

        Ok(purgeable.len() as u64)
    }

    async fn get_snapshot(&self, id: Id) -> Result<Option<SchemaSnapshot>> {
        Ok(self.tables.read().snapshots.get(&id).cloned())
    }

    async fn list_snapshots(&self, model_id: Id) -> Result<Vec<SchemaSnapshot>> {
        let tables = self.tables.read();
        Ok(tables
            .snapshots
            .values()
            .filter(|snapshot| snapshot.model_id == model_id)
            .cloned()
            .collect())
    }

    async fn model_ids_by_creator(
        &self,
        creator: ActorId,
        after: Option<Id>,
        limit: usize,
    ) -> Result<Vec<Id>> {
        let tables = self.tables.read();
        let lower = after.unwrap_or(0);
        Ok(tables
            .models
            .range(lower + 1..)
            .filter(|(_, model)| model.creator_id == creator)
            .map(|(id, _)| *id)
            .take(limit)
            .collect())
    }
}

#[async_trait::async_trait]
impl EntryStore for MemoryStore {
    async fn count_entries(&self, criteria: &EntrySearchCriteria) -> Result<u64> {
        check_criteria(criteria, &ENTRY_COLUMNS)?;
        let tables = self.tables.read();
        Ok(tables.matching_entries(criteria).len() as u64)
    }

    async fn list_entries(
        &self,
        page: Pagination,
        criteria: &EntrySearchCriteria,
    ) -> Result<Vec<Entry>> {
        check_criteria(criteria, &ENTRY_COLUMNS)?;
        let tables = self.tables.read();
        let mut entries: Vec<Entry> = tables.matching_entries(criteria).into_iter().cloned().collect();
        RecordFilter::sort(&mut entries, criteria.sort());
        Ok(page_of(entries, page))
    }

    async fn get_entry(&self, id: Id, include_deleted: bool) -> Result<Option<Entry>> {
        let tables = self.tables.read();
        Ok(tables
            .entries
            .get(&id)
            .filter(|entry| include_deleted || !entry.is_deleted())
            .cloned())
    }

    async fn insert_entry(&self, entry: NewEntry, actor: ActorId) -> Result<Id> {
        let mut tables = self.tables.write();
        if tables.live_model(entry.model_id).is_none() {
            return Err(EngineError::validation("model_id", "model does not exist"));
        }

        let now = Utc::now();
        let id = Tables::next_id(&mut tables.next_entry_id);
        tables.entries.insert(
            id,
            Entry {
                id,
                model_id: entry.model_id,
                name: entry.name,
                data: entry.data,
                creator_id: actor,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
        );
        Ok(id)
    }

    async fn update_entry(&self, id: Id, changes: EntryChanges, _actor: ActorId) -> Result<bool> {
        let mut tables = self.tables.write();
        if let Some(model_id) = changes.model_id {
            if tables.live_model(model_id).is_none() {
                return Err(EngineError::validation("model_id", "model does not exist"));
            }
        }

        let Some(entry) = tables.entries.get_mut(&id).filter(|entry| !entry.is_deleted()) else {
            return Ok(false);
        };
        if let Some(model_id) = changes.model_id {
            entry.model_id = model_id;
        }
        if let Some(name) = changes.name {
            entry.name = name;
        }
        if let Some(data) = changes.data {
            entry.data = data;
        }
        entry.updated_at = Utc::now();
        Ok(true)
    }

    async fn soft_delete_entries(&self, ids: &[Id], _actor: ActorId) -> Result<u64> {
        let mut tables = self.tables.write();
        let now = Utc::now();
        let mut deleted = 0;
        for id in ids {
            match tables.entries.get_mut(id) {
                Some(entry) if !entry.is_deleted() => {
                    entry.deleted_at = Some(now);
                    entry.updated_at = now;
                    deleted += 1;
                }
                _ => {}
            }
        }
        Ok(deleted)
    }

    async fn purge_entries(&self, ids: &[Id]) -> Result<u64> {
        let mut tables = self.tables.write();
        let before = tables.entries.len();
        tables
            .entries
            .retain(|id, _| !ids.contains(id));
        Ok((before - tables.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Condition, FieldDef, FieldType, SortKey};
    use serde_json::json;

    fn new_model(name: &str) -> NewModel {
        NewModel {
            name: name.to_string(),
            slug: None,
            fields: vec![FieldDef::new("title", FieldType::Text)],
        }
    }

    fn new_entry(model_id: Id, name: &str, data: serde_json::Value) -> NewEntry {
        NewEntry {
            model_id,
            name: name.to_string(),
            data: data.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn test_derived_slugs_are_suffixed() {
        let store = MemoryStore::new();
        let a = store.insert_model(new_model("Project Alpha"), 1).await.unwrap();
        let b = store.insert_model(new_model("Project Alpha"), 1).await.unwrap();

        assert_eq!(store.get_model(a, false).await.unwrap().unwrap().slug, "project-alpha");
        assert_eq!(store.get_model(b, false).await.unwrap().unwrap().slug, "project-alpha-2");
    }

    #[tokio::test]
    async fn test_explicit_slug_conflict() {
        let store = MemoryStore::new();
        store.insert_model(new_model("Alpha"), 1).await.unwrap();
        let mut duplicate = new_model("Other");
        duplicate.slug = Some("alpha".to_string());

        let err = store.insert_model(duplicate, 1).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_fields_update_appends_snapshot() {
        let store = MemoryStore::new();
        let id = store.insert_model(new_model("Alpha"), 1).await.unwrap();
        let first = store.get_model(id, false).await.unwrap().unwrap().current_schema_id;

        let changes = ModelChanges {
            fields: Some(vec![FieldDef::new("price", FieldType::Number)]),
            ..Default::default()
        };
        assert!(store.update_model(id, changes, 2).await.unwrap());

        let model = store.get_model(id, false).await.unwrap().unwrap();
        assert_ne!(model.current_schema_id, first);
        assert_eq!(model.fields[0].id, "price");

        let history = store.list_snapshots(id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].fields[0].id, "title");
        assert_eq!(history[1].creator_id, 2);
    }

    #[tokio::test]
    async fn test_soft_delete_cascades_then_purge() {
        let store = MemoryStore::new();
        let model_id = store.insert_model(new_model("Alpha"), 1).await.unwrap();
        let entry_id = store
            .insert_entry(new_entry(model_id, "First", json!({})), 1)
            .await
            .unwrap();

        assert_eq!(store.soft_delete_models(&[model_id], 1).await.unwrap(), 1);
        assert_eq!(store.soft_delete_models(&[model_id], 1).await.unwrap(), 0);
        assert!(store.get_entry(entry_id, false).await.unwrap().is_none());
        assert!(store.get_entry(entry_id, true).await.unwrap().is_some());

        assert_eq!(store.purge_models(&[model_id]).await.unwrap(), 1);
        assert!(store.get_model(model_id, true).await.unwrap().is_none());
        assert!(store.get_entry(entry_id, true).await.unwrap().is_none());
        assert!(store.list_snapshots(model_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_removes_live_records() {
        let store = MemoryStore::new();
        let model_id = store.insert_model(new_model("Safe Model"), 999).await.unwrap();
        let other_id = store.insert_model(new_model("Bystander"), 999).await.unwrap();
        let entry_id = store
            .insert_entry(new_entry(model_id, "First", json!({})), 999)
            .await
            .unwrap();
        let kept_id = store
            .insert_entry(new_entry(other_id, "Kept", json!({})), 999)
            .await
            .unwrap();

        assert_eq!(store.purge_models(&[model_id, model_id]).await.unwrap(), 1);
        assert!(store.get_model(model_id, true).await.unwrap().is_none());
        assert!(store.get_entry(entry_id, true).await.unwrap().is_none());
        assert!(store.list_snapshots(model_id).await.unwrap().is_empty());
        assert!(store.get_model(other_id, false).await.unwrap().is_some());

        assert_eq!(store.purge_entries(&[kept_id]).await.unwrap(), 1);
        assert!(store.get_entry(kept_id, true).await.unwrap().is_none());
        assert_eq!(store.purge_models(&[model_id]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_entry_insert_requires_live_model() {
        let store = MemoryStore::new();
        let model_id = store.insert_model(new_model("Alpha"), 1).await.unwrap();
        store.soft_delete_models(&[model_id], 1).await.unwrap();

        let err = store
            .insert_entry(new_entry(model_id, "Late", json!({})), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(ref e) if e.contains_key("model_id")));
    }

    #[tokio::test]
    async fn test_count_matches_list() {
        let store = MemoryStore::new();
        let model_id = store.insert_model(new_model("Alpha"), 1).await.unwrap();
        for (name, price) in [("Cheap", 5), ("Mid", 50), ("Dear", 500)] {
            store
                .insert_entry(new_entry(model_id, name, json!({"price": price})), 1)
                .await
                .unwrap();
        }

        let criteria = EntrySearchCriteria::new(
            SearchCriteria::new()
                .with_custom_filter("price", Condition::new(crate::model::FilterOp::Gte, "50"))
                .sort_by(vec![SortKey::asc("name")]),
        )
        .for_model(model_id);

        let count = store.count_entries(&criteria).await.unwrap();
        let list = store
            .list_entries(Pagination::new(1, 100), &criteria)
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "Dear");
    }

    #[tokio::test]
    async fn test_model_ids_by_creator_keyset() {
        let store = MemoryStore::new();
        let mut own = Vec::new();
        for i in 0..5 {
            own.push(store.insert_model(new_model(&format!("Mine {}", i)), 7).await.unwrap());
            store.insert_model(new_model(&format!("Other {}", i)), 8).await.unwrap();
        }

        let first = store.model_ids_by_creator(7, None, 3).await.unwrap();
        assert_eq!(first, own[..3].to_vec());
        let rest = store.model_ids_by_creator(7, first.last().copied(), 3).await.unwrap();
        assert_eq!(rest, own[3..].to_vec());
    }
}
