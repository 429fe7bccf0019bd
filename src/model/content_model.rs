use crate::model::{ActorId, FieldDef, Id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user-defined record-type blueprint.
/// `fields` is the inlined field list of the snapshot `current_schema_id` points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub creator_id: ActorId,
    pub current_schema_id: Id,
    pub fields: Vec<FieldDef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn field(&self, field_id: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.id == field_id)
    }
}

/// Validated input for model creation
#[derive(Debug, Clone, PartialEq)]
pub struct NewModel {
    pub name: String,
    /// Explicit slug; must be unique. When absent the store derives one from
    /// the name and suffixes it until it is unique.
    pub slug: Option<String>,
    pub fields: Vec<FieldDef>,
}

/// Validated partial update. `None` leaves the attribute untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelChanges {
    pub name: Option<String>,
    pub slug: Option<String>,
    /// When present a new schema snapshot is appended and made current
    pub fields: Option<Vec<FieldDef>>,
}

impl ModelChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.slug.is_none() && self.fields.is_none()
    }
}

/// Result of a partial update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    Updated,
    /// The payload carried nothing to change; timestamps were not touched
    NoChanges,
}
