use std::sync::Arc;

use crate::error::{EngineError, EntityKind, Result};
use crate::logic::validate::{self, Payload};
use crate::model::{
    project_all, ActorId, Entry, EntrySearchCriteria, Id, Model, Pagination, Projection,
    UpdateOutcome,
};
use crate::store::Store;

/// Operations on entries. Data is type-checked against the owning model's
/// current schema at write time.
pub struct EntryService<S> {
    store: Arc<S>,
}

impl<S> Clone for EntryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> EntryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn count(&self, criteria: &EntrySearchCriteria) -> Result<u64> {
        self.store.count_entries(criteria).await
    }

    pub async fn paginate(
        &self,
        page: u32,
        limit: u32,
        criteria: &EntrySearchCriteria,
    ) -> Result<Vec<Projection<Entry>>> {
        let entries = self
            .store
            .list_entries(Pagination::new(page, limit), criteria)
            .await?;
        Ok(project_all(entries, criteria.selected_fields()))
    }

    pub async fn find(&self, id: Id) -> Result<Entry> {
        self.store
            .get_entry(id, false)
            .await?
            .ok_or_else(|| EngineError::not_found(EntityKind::Entry, id))
    }

    pub async fn create(&self, payload: &Payload, actor: ActorId) -> Result<Id> {
        let entry = validate::new_entry(payload)?;
        let model = self.live_model(entry.model_id).await?;
        validate::check_entry_data(&entry.data, &model.fields, true)?;

        let model_id = entry.model_id;
        let id = self.store.insert_entry(entry, actor).await?;
        log::info!("Entry {} created in model {} by user {}", id, model_id, actor);
        Ok(id)
    }

    pub async fn update(&self, id: Id, payload: &Payload, actor: ActorId) -> Result<UpdateOutcome> {
        let changes = validate::entry_changes(payload)?;
        let current = self.find(id).await?;

        if changes.is_empty() {
            log::debug!("Update of entry {} carried no changes", id);
            return Ok(UpdateOutcome::NoChanges);
        }

        if changes.model_id.is_some() || changes.data.is_some() {
            let model = self
                .live_model(changes.model_id.unwrap_or(current.model_id))
                .await?;
            let data = changes.data.as_ref().unwrap_or(&current.data);
            validate::check_entry_data(data, &model.fields, false)?;
        }

        if !self.store.update_entry(id, changes, actor).await? {
            return Err(EngineError::not_found(EntityKind::Entry, id));
        }
        log::info!("Entry {} updated by user {}", id, actor);
        Ok(UpdateOutcome::Updated)
    }

    pub async fn delete_entries(&self, ids: &[Id], actor: ActorId) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = self.store.soft_delete_entries(ids, actor).await?;
        log::info!("User {} soft-deleted {} of {} entries", actor, deleted, ids.len());
        Ok(deleted)
    }

    pub async fn purge_entries(&self, ids: &[Id]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let purged = self.store.purge_entries(ids).await?;
        log::info!("Purged {} of {} entries", purged, ids.len());
        Ok(purged)
    }

    async fn live_model(&self, model_id: Id) -> Result<Model> {
        self.store
            .get_model(model_id, false)
            .await?
            .ok_or_else(|| EngineError::validation("model_id", "model does not exist"))
    }
}
