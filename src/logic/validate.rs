//! Boundary validation: loosely typed JSON payloads in, strict types out.
//! Nothing that fails to parse reaches a store.

use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::ValidationErrors;
use crate::logic::record_filter::is_plain_number;
use crate::model::{
    is_valid_slug, parse_timestamp, EntryChanges, EntryData, FieldDef, FieldType, Id,
    ModelChanges, NewEntry, NewModel, NAME_MAX_CHARS, NAME_MIN_CHARS,
};

/// A JSON-decoded request body
pub type Payload = Map<String, Value>;

const MODEL_KEYS: [&str; 3] = ["name", "slug", "fields"];
const ENTRY_KEYS: [&str; 3] = ["model_id", "name", "fields"];
const FIELD_DEF_KEYS: [&str; 4] = ["id", "type", "label", "required"];

pub fn new_model(payload: &Payload) -> Result<NewModel, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    reject_unknown_keys(payload, &MODEL_KEYS, &mut errors);

    let name = match payload.get("name") {
        Some(value) => name_value(value, &mut errors),
        None => {
            errors.add("name", "is required");
            None
        }
    };
    let slug = payload
        .get("slug")
        .and_then(|value| slug_value(value, &mut errors));
    let fields = match payload.get("fields") {
        Some(value) => field_defs(value).map_err(|e| errors.merge(e)).ok(),
        None => {
            errors.add("fields", "is required");
            None
        }
    };

    errors.into_result()?;
    match (name, fields) {
        (Some(name), Some(fields)) => Ok(NewModel { name, slug, fields }),
        _ => Err(ValidationErrors::single("payload", "is incomplete")),
    }
}

pub fn model_changes(payload: &Payload) -> Result<ModelChanges, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    reject_unknown_keys(payload, &MODEL_KEYS, &mut errors);

    let changes = ModelChanges {
        name: payload
            .get("name")
            .and_then(|value| name_value(value, &mut errors)),
        slug: payload
            .get("slug")
            .and_then(|value| slug_value(value, &mut errors)),
        fields: payload
            .get("fields")
            .and_then(|value| field_defs(value).map_err(|e| errors.merge(e)).ok()),
    };

    errors.into_result().map(|_| changes)
}

/// Parse a `fields` schema payload: a JSON array, or a string holding one.
/// Every element needs a unique non-empty string `id` and a supported `type`.
pub fn field_defs(raw: &Value) -> Result<Vec<FieldDef>, ValidationErrors> {
    let decoded = decode_json_string(raw, "fields")?;
    let Value::Array(items) = decoded else {
        return Err(ValidationErrors::single(
            "fields",
            "must be a list of field descriptors",
        ));
    };

    let mut errors = ValidationErrors::new();
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let key = |attr: &str| format!("fields.{}.{}", index, attr);
        let Value::Object(obj) = item else {
            errors.add(format!("fields.{}", index), "must be an object");
            continue;
        };

        for attr in obj.keys() {
            if !FIELD_DEF_KEYS.contains(&attr.as_str()) {
                errors.add(key(attr.as_str()), "unknown field attribute");
            }
        }

        let id = match obj.get("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => {
                let id = id.trim().to_string();
                if !seen.insert(id.clone()) {
                    errors.add(key("id"), format!("duplicate field id '{}'", id));
                }
                Some(id)
            }
            Some(_) => {
                errors.add(key("id"), "must be a non-empty string");
                None
            }
            None => {
                errors.add(key("id"), "is required");
                None
            }
        };

        let field_type = match obj.get("type") {
            Some(Value::String(t)) => match t.parse::<FieldType>() {
                Ok(field_type) => Some(field_type),
                Err(message) => {
                    errors.add(key("type"), message);
                    None
                }
            },
            Some(_) => {
                errors.add(key("type"), "must be a string");
                None
            }
            None => {
                errors.add(key("type"), "is required");
                None
            }
        };

        let label = match obj.get("label") {
            None | Some(Value::Null) => None,
            Some(Value::String(label)) => Some(label.clone()),
            Some(_) => {
                errors.add(key("label"), "must be a string");
                None
            }
        };

        let required = match obj.get("required") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) if n.as_i64() == Some(0) || n.as_i64() == Some(1) => {
                n.as_i64() == Some(1)
            }
            Some(_) => {
                errors.add(key("required"), "must be a boolean");
                false
            }
        };

        if let (Some(id), Some(field_type)) = (id, field_type) {
            fields.push(FieldDef {
                id,
                field_type,
                label,
                required,
            });
        }
    }

    errors.into_result().map(|_| fields)
}

pub fn new_entry(payload: &Payload) -> Result<NewEntry, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    reject_unknown_keys(payload, &ENTRY_KEYS, &mut errors);

    let model_id = match payload.get("model_id") {
        Some(value) => model_id_value(value, &mut errors),
        None => {
            errors.add("model_id", "is required");
            None
        }
    };
    let name = match payload.get("name") {
        Some(value) => name_value(value, &mut errors),
        None => {
            errors.add("name", "is required");
            None
        }
    };
    let data = match payload.get("fields") {
        Some(value) => entry_data(value).map_err(|e| errors.merge(e)).ok(),
        None => {
            errors.add("fields", "is required");
            None
        }
    };

    errors.into_result()?;
    match (model_id, name, data) {
        (Some(model_id), Some(name), Some(data)) => Ok(NewEntry {
            model_id,
            name,
            data,
        }),
        _ => Err(ValidationErrors::single("payload", "is incomplete")),
    }
}

pub fn entry_changes(payload: &Payload) -> Result<EntryChanges, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    reject_unknown_keys(payload, &ENTRY_KEYS, &mut errors);

    let changes = EntryChanges {
        model_id: payload
            .get("model_id")
            .and_then(|value| model_id_value(value, &mut errors)),
        name: payload
            .get("name")
            .and_then(|value| name_value(value, &mut errors)),
        data: payload
            .get("fields")
            .and_then(|value| entry_data(value).map_err(|e| errors.merge(e)).ok()),
    };

    errors.into_result().map(|_| changes)
}

/// Entry data: a JSON object, or a string holding one. `[]` reads as `{}`.
pub fn entry_data(raw: &Value) -> Result<EntryData, ValidationErrors> {
    match decode_json_string(raw, "fields")? {
        Value::Object(map) => Ok(map),
        Value::Array(items) if items.is_empty() => Ok(Map::new()),
        _ => Err(ValidationErrors::single("fields", "must be a JSON object")),
    }
}

/// Check entry values against the model's current schema.
/// Keys the schema does not know are tolerated.
pub fn check_entry_data(
    data: &EntryData,
    schema: &[FieldDef],
    enforce_required: bool,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    for field in schema {
        let key = format!("fields.{}", field.id);
        match data.get(&field.id) {
            None | Some(Value::Null) => {
                if enforce_required && field.required {
                    errors.add(key, "is required");
                }
            }
            Some(value) => {
                if let Err(message) = check_value(field.field_type, value) {
                    errors.add(key, message);
                }
            }
        }
    }

    for key in data.keys() {
        if !schema.iter().any(|f| &f.id == key) {
            log::debug!("Entry data key '{}' is not part of the current schema", key);
        }
    }

    errors.into_result()
}

fn check_value(field_type: FieldType, value: &Value) -> Result<(), String> {
    let ok = match field_type {
        FieldType::Text | FieldType::Textarea => value.is_string(),
        FieldType::Number => match value {
            Value::Number(_) => true,
            // Same test the numeric filters apply, so stored strings stay comparable
            Value::String(s) => is_plain_number(s),
            _ => false,
        },
        FieldType::Boolean => match value {
            Value::Bool(_) => true,
            Value::Number(n) => matches!(n.as_i64(), Some(0) | Some(1)),
            _ => false,
        },
        FieldType::Date => value
            .as_str()
            .map(|s| chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").is_ok())
            .unwrap_or(false),
        FieldType::Datetime => value.as_str().and_then(parse_timestamp).is_some(),
        FieldType::Email => value
            .as_str()
            .map(|s| match s.split_once('@') {
                Some((local, domain)) => !local.is_empty() && domain.contains('.'),
                None => false,
            })
            .unwrap_or(false),
        FieldType::Url => value
            .as_str()
            .map(|s| s.starts_with("http://") || s.starts_with("https://"))
            .unwrap_or(false),
    };

    if ok {
        Ok(())
    } else {
        Err(format!("must be a valid {} value", field_type))
    }
}

fn reject_unknown_keys(payload: &Payload, allowed: &[&str], errors: &mut ValidationErrors) {
    for key in payload.keys() {
        if !allowed.contains(&key.as_str()) {
            errors.add(key.clone(), "unknown attribute");
        }
    }
}

fn name_value(value: &Value, errors: &mut ValidationErrors) -> Option<String> {
    let Value::String(name) = value else {
        errors.add("name", "must be a string");
        return None;
    };
    let name = name.trim();
    let chars = name.chars().count();
    if chars < NAME_MIN_CHARS {
        errors.add("name", format!("must be at least {} characters", NAME_MIN_CHARS));
        return None;
    }
    if chars > NAME_MAX_CHARS {
        errors.add("name", format!("must be at most {} characters", NAME_MAX_CHARS));
        return None;
    }
    Some(name.to_string())
}

fn slug_value(value: &Value, errors: &mut ValidationErrors) -> Option<String> {
    match value {
        Value::String(slug) if is_valid_slug(slug) => Some(slug.clone()),
        _ => {
            errors.add("slug", "must be lowercase letters, digits and single dashes");
            None
        }
    }
}

fn model_id_value(value: &Value, errors: &mut ValidationErrors) -> Option<Id> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<Id>().ok(),
        _ => None,
    };
    match parsed {
        Some(id) if id > 0 => Some(id),
        _ => {
            errors.add("model_id", "must be a positive integer");
            None
        }
    }
}

/// Accept either an already-decoded JSON value or a string carrying JSON
fn decode_json_string(raw: &Value, key: &str) -> Result<Value, ValidationErrors> {
    match raw {
        Value::String(encoded) => serde_json::from_str(encoded)
            .map_err(|_| ValidationErrors::single(key, "must be valid JSON")),
        other => Ok(other.clone()),
    }
}
