use std::sync::Arc;

use crate::error::{EngineError, EntityKind, Result};
use crate::logic::validate::{self, Payload};
use crate::model::{
    project_all, ActorId, Id, Model, Pagination, Projection, SchemaSnapshot, SearchCriteria,
    UpdateOutcome,
};
use crate::store::ModelStore;

/// Operations on model blueprints and their schema history
pub struct ModelService<S> {
    store: Arc<S>,
}

impl<S> Clone for ModelService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ModelStore> ModelService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Number of live models matching `criteria`
    pub async fn count(&self, criteria: &SearchCriteria) -> Result<u64> {
        self.store.count_models(criteria).await
    }

    /// One page of live models, projected to the criteria's selected fields
    pub async fn paginate(
        &self,
        page: u32,
        limit: u32,
        criteria: &SearchCriteria,
    ) -> Result<Vec<Projection<Model>>> {
        let models = self
            .store
            .list_models(Pagination::new(page, limit), criteria)
            .await?;
        Ok(project_all(models, criteria.selected_fields()))
    }

    pub async fn find(&self, id: Id) -> Result<Model> {
        self.store
            .get_model(id, false)
            .await?
            .ok_or_else(|| EngineError::not_found(EntityKind::Model, id))
    }

    pub async fn create(&self, payload: &Payload, actor: ActorId) -> Result<Id> {
        let model = validate::new_model(payload)?;
        let name = model.name.clone();
        let id = self.store.insert_model(model, actor).await?;
        log::info!("Model {} '{}' created by user {}", id, name, actor);
        Ok(id)
    }

    pub async fn update(&self, id: Id, payload: &Payload, actor: ActorId) -> Result<UpdateOutcome> {
        let changes = validate::model_changes(payload)?;
        // Existence is checked before the no-op shortcut
        self.find(id).await?;

        if changes.is_empty() {
            log::debug!("Update of model {} carried no changes", id);
            return Ok(UpdateOutcome::NoChanges);
        }

        let new_schema = changes.fields.is_some();
        if !self.store.update_model(id, changes, actor).await? {
            return Err(EngineError::not_found(EntityKind::Model, id));
        }

        if new_schema {
            log::info!("Model {} updated with a new schema by user {}", id, actor);
        } else {
            log::info!("Model {} updated by user {}", id, actor);
        }
        Ok(UpdateOutcome::Updated)
    }

    /// Idempotent soft delete; also tombstones the models' entries
    pub async fn delete_models(&self, ids: &[Id], actor: ActorId) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = self.store.soft_delete_models(ids, actor).await?;
        log::info!("User {} soft-deleted {} of {} models", actor, deleted, ids.len());
        Ok(deleted)
    }

    /// Irreversibly remove models with their entries and snapshots
    pub async fn purge_models(&self, ids: &[Id]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let purged = self.store.purge_models(ids).await?;
        log::info!("Purged {} of {} models", purged, ids.len());
        Ok(purged)
    }

    /// A schema snapshot by id; retained snapshots stay readable after the
    /// model moves on to a newer schema
    pub async fn snapshot(&self, id: Id) -> Result<SchemaSnapshot> {
        self.store
            .get_snapshot(id)
            .await?
            .ok_or_else(|| EngineError::not_found(EntityKind::Schema, id))
    }

    /// Every schema version of a live model, oldest first
    pub async fn history(&self, model_id: Id) -> Result<Vec<SchemaSnapshot>> {
        self.find(model_id).await?;
        self.store.list_snapshots(model_id).await
    }
}
