use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use std::ops::Deref;
use std::sync::Arc;

/// A record paired with the attribute list the caller asked for.
/// Derefs to the full record; serializes only the selected attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection<T> {
    record: T,
    fields: Option<Arc<[String]>>,
}

impl<T> Projection<T> {
    pub fn new(record: T, fields: Option<Arc<[String]>>) -> Self {
        Self { record, fields }
    }

    pub fn full(record: T) -> Self {
        Self::new(record, None)
    }

    pub fn fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    pub fn into_inner(self) -> T {
        self.record
    }
}

impl<T> Deref for Projection<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

impl<T: Serialize> Projection<T> {
    /// JSON form restricted to the selected attributes
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        let value = serde_json::to_value(&self.record)?;
        let Some(fields) = &self.fields else {
            return Ok(value);
        };
        match value {
            serde_json::Value::Object(mut map) => {
                map.retain(|key, _| fields.iter().any(|f| f == key));
                Ok(serde_json::Value::Object(map))
            }
            other => Ok(other),
        }
    }
}

impl<T: Serialize> Serialize for Projection<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

/// Wrap a page of records with the same projection
pub fn project_all<T>(records: Vec<T>, fields: Option<&[String]>) -> Vec<Projection<T>> {
    let fields: Option<Arc<[String]>> = fields.map(Arc::from);
    records
        .into_iter()
        .map(|record| Projection::new(record, fields.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Row {
        id: i64,
        name: String,
        slug: String,
    }

    #[test]
    fn test_projection_serializes_selected_fields_only() {
        let fields = vec!["id".to_string(), "name".to_string(), "missing".to_string()];
        let rows = project_all(
            vec![Row {
                id: 7,
                name: "Apple".to_string(),
                slug: "apple".to_string(),
            }],
            Some(&fields),
        );

        assert_eq!(rows[0].name, "Apple");
        assert_eq!(
            serde_json::to_value(&rows[0]).unwrap(),
            json!({"id": 7, "name": "Apple"})
        );
    }

    #[test]
    fn test_full_projection_keeps_everything() {
        let row = Projection::full(Row {
            id: 1,
            name: "Beta".to_string(),
            slug: "beta".to_string(),
        });
        assert_eq!(
            row.to_value().unwrap(),
            json!({"id": 1, "name": "Beta", "slug": "beta"})
        );
    }
}
