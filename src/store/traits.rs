use crate::error::Result;
use crate::model::{
    ActorId, Entry, EntryChanges, EntrySearchCriteria, Id, Model, ModelChanges, NewEntry,
    NewModel, Pagination, SchemaSnapshot, SearchCriteria,
};

/// Storage for model blueprints and their schema snapshots.
///
/// `count_models` and `list_models` must evaluate exactly the same predicate
/// set for a given criteria.
#[async_trait::async_trait]
pub trait ModelStore: Send + Sync {
    /// Count live models matching the criteria
    async fn count_models(&self, criteria: &SearchCriteria) -> Result<u64>;
    /// One page of live models matching the criteria, with inlined fields
    async fn list_models(&self, page: Pagination, criteria: &SearchCriteria) -> Result<Vec<Model>>;
    /// Get a model by id; tombstoned models only when `include_deleted`
    async fn get_model(&self, id: Id, include_deleted: bool) -> Result<Option<Model>>;
    /// Insert the model row and its first schema snapshot atomically
    async fn insert_model(&self, model: NewModel, actor: ActorId) -> Result<Id>;
    /// Apply changes to a live model. A field list appends a new snapshot and
    /// repoints `current_schema_id` in the same unit of work.
    /// Returns false when the model is absent or tombstoned.
    async fn update_model(&self, id: Id, changes: ModelChanges, actor: ActorId) -> Result<bool>;
    /// Tombstone live models and their live entries. Returns models newly tombstoned.
    async fn soft_delete_models(&self, ids: &[Id], actor: ActorId) -> Result<u64>;
    /// Remove models, live or tombstoned, with all their entries and snapshots.
    /// Returns models removed.
    async fn purge_models(&self, ids: &[Id]) -> Result<u64>;
    async fn get_snapshot(&self, id: Id) -> Result<Option<SchemaSnapshot>>;
    /// All snapshots of a model, oldest first
    async fn list_snapshots(&self, model_id: Id) -> Result<Vec<SchemaSnapshot>>;
    /// Ids of a creator's models (tombstoned included) above `after`, ascending
    async fn model_ids_by_creator(
        &self,
        creator: ActorId,
        after: Option<Id>,
        limit: usize,
    ) -> Result<Vec<Id>>;
}

/// Storage for entries
#[async_trait::async_trait]
pub trait EntryStore: Send + Sync {
    async fn count_entries(&self, criteria: &EntrySearchCriteria) -> Result<u64>;
    async fn list_entries(
        &self,
        page: Pagination,
        criteria: &EntrySearchCriteria,
    ) -> Result<Vec<Entry>>;
    async fn get_entry(&self, id: Id, include_deleted: bool) -> Result<Option<Entry>>;
    /// Insert an entry; fails with a validation error when the model is not live
    async fn insert_entry(&self, entry: NewEntry, actor: ActorId) -> Result<Id>;
    /// Returns false when the entry is absent or tombstoned
    async fn update_entry(&self, id: Id, changes: EntryChanges, actor: ActorId) -> Result<bool>;
    async fn soft_delete_entries(&self, ids: &[Id], actor: ActorId) -> Result<u64>;
    /// Remove entries whether or not they are tombstoned. Returns entries removed.
    async fn purge_entries(&self, ids: &[Id]) -> Result<u64>;
}

pub trait Store: ModelStore + EntryStore + Send + Sync {}

impl<T: ModelStore + EntryStore + Send + Sync> Store for T {}
