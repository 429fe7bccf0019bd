use crate::model::{ActorId, Id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type EntryData = Map<String, Value>;

/// A record belonging to exactly one model.
/// `data` is shaped by the model schema current at write time and is not
/// re-validated when the schema changes later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Id,
    pub model_id: Id,
    pub name: String,
    pub data: EntryData,
    pub creator_id: ActorId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Validated input for entry creation
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub model_id: Id,
    pub name: String,
    pub data: EntryData,
}

/// Validated partial update for an entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryChanges {
    pub model_id: Option<Id>,
    pub name: Option<String>,
    /// Replaces the whole data document
    pub data: Option<EntryData>,
}

impl EntryChanges {
    pub fn is_empty(&self) -> bool {
        self.model_id.is_none() && self.name.is_none() && self.data.is_none()
    }
}
