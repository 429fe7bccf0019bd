use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::logic::ModelService;
use crate::model::{ActorId, FieldType, Id};
use crate::store::Store;

/// Actor recorded as creator of every seeded model; the purge tool sweeps by it
pub const SEEDER_ACTOR_ID: ActorId = 9_000_001;

pub const SEED_MODEL_COUNT: usize = 12;

/// Leading names are fixed so text search can be demonstrated
const PREDICTABLE_NAMES: [&str; 5] = [
    "Project Alpha",
    "Project Beta",
    "Gamma Ray",
    "Delta Force",
    "Omega Protocol",
];

const ADJECTIVES: [&str; 7] = ["Quiet", "Amber", "Rapid", "Hollow", "Crimson", "Lunar", "Silent"];
const NOUNS: [&str; 7] = ["Harbor", "Engine", "Archive", "Garden", "Signal", "Ledger", "Summit"];
const LABELS: [&str; 8] = [
    "Title", "Summary", "Price", "In Stock", "Release Date", "Notes", "Rating", "Published",
];
const SEED_TYPES: [FieldType; 5] = [
    FieldType::Text,
    FieldType::Textarea,
    FieldType::Number,
    FieldType::Boolean,
    FieldType::Date,
];

/// Name of the i-th seeded model
fn seed_name(i: usize) -> String {
    match PREDICTABLE_NAMES.get(i) {
        Some(name) => name.to_string(),
        None => format!(
            "{} {} {}",
            ADJECTIVES[i % ADJECTIVES.len()],
            NOUNS[(i * 3) % NOUNS.len()],
            i + 1
        ),
    }
}

/// Between 2 and 8 field descriptors with uuid field ids
fn seed_fields(i: usize) -> Value {
    let count = 2 + (i * 5) % 7;
    let fields: Vec<Value> = (0..count)
        .map(|j| {
            json!({
                "id": uuid::Uuid::new_v4().to_string(),
                "type": SEED_TYPES[(i + j) % SEED_TYPES.len()].as_str(),
                "label": LABELS[(i + j) % LABELS.len()],
                "required": (i + j) % 3 == 0,
            })
        })
        .collect();
    Value::Array(fields)
}

/// Create the demo models. Failures are logged per model and seeding continues.
pub async fn load_seed_data<S: Store>(store: Arc<S>) -> Result<Vec<Id>> {
    let models = ModelService::new(store);
    let mut created = Vec::with_capacity(SEED_MODEL_COUNT);

    log::info!("Seeding {} models", SEED_MODEL_COUNT);
    for i in 0..SEED_MODEL_COUNT {
        let payload = json!({ "name": seed_name(i), "fields": seed_fields(i) });
        let payload = payload
            .as_object()
            .cloned()
            .context("Seed payload is not an object")?;

        match models.create(&payload, SEEDER_ACTOR_ID).await {
            Ok(id) => created.push(id),
            Err(e) => log::warn!("Failed to seed model '{}': {}", seed_name(i), e),
        }
    }

    log::info!("Seeded {} of {} models", created.len(), SEED_MODEL_COUNT);
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SearchCriteria;
    use crate::store::MemoryStore;

    #[test]
    fn test_seed_names_start_predictable() {
        assert_eq!(seed_name(0), "Project Alpha");
        assert_eq!(seed_name(4), "Omega Protocol");
        assert!(seed_name(5).ends_with(" 6"));
    }

    #[test]
    fn test_seed_field_counts_in_range() {
        for i in 0..SEED_MODEL_COUNT {
            let fields = seed_fields(i);
            let count = fields.as_array().unwrap().len();
            assert!((2..=8).contains(&count), "model {} has {} fields", i, count);
        }
    }

    #[tokio::test]
    async fn test_load_seed_data() {
        let store = Arc::new(MemoryStore::new());
        let ids = load_seed_data(Arc::clone(&store)).await.unwrap();
        assert_eq!(ids.len(), SEED_MODEL_COUNT);

        let models = ModelService::new(store);
        let project = SearchCriteria::new().search("project");
        assert_eq!(models.count(&project).await.unwrap(), 2);
    }
}
