use crate::model::Id;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Which kind of record an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Model,
    Entry,
    Schema,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Model => write!(f, "Model"),
            EntityKind::Entry => write!(f, "Entry"),
            EntityKind::Schema => write!(f, "Schema"),
        }
    }
}

/// Per-key validation messages, keyed by the offending input path
/// (e.g. `name`, `fields.2.type`, `filter.model_id`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(key: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(key, message);
        errors
    }

    /// Record a message; the first message for a key wins
    pub fn add(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.0.entry(key.into()).or_insert_with(|| message.into());
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (key, message) in other.0 {
            self.add(key, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn messages(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Ok(()) when nothing was recorded
    pub fn into_result(self) -> std::result::Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(key, message)| format!("{}: {}", key, message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: Id },

    /// Reserved for uniqueness constraints such as duplicate slugs
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backing store failure; the message never carries store detail
    #[error("storage failure")]
    Storage(#[source] anyhow::Error),
}

impl EngineError {
    pub fn validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Validation(ValidationErrors::single(key, message))
    }

    pub fn not_found(entity: EntityKind, id: Id) -> Self {
        EngineError::NotFound { entity, id }
    }

    pub fn storage(error: impl Into<anyhow::Error>) -> Self {
        EngineError::Storage(error.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }
}

impl From<ValidationErrors> for EngineError {
    fn from(errors: ValidationErrors) -> Self {
        EngineError::Validation(errors)
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(error: sqlx::Error) -> Self {
        // 23505 = unique_violation
        if let sqlx::Error::Database(db_error) = &error {
            if db_error.code().as_deref() == Some("23505") {
                return EngineError::Conflict(db_error.message().to_string());
            }
        }
        EngineError::Storage(anyhow::Error::new(error))
    }
}

/// `anyhow::Context` for database calls that keeps unique violations as conflicts
pub trait StorageContext<T> {
    fn storage_context(self, context: &'static str) -> Result<T>;
}

impl<T> StorageContext<T> for std::result::Result<T, sqlx::Error> {
    fn storage_context(self, context: &'static str) -> Result<T> {
        self.map_err(|error| match EngineError::from(error) {
            EngineError::Storage(source) => EngineError::Storage(source.context(context)),
            other => other,
        })
    }
}
