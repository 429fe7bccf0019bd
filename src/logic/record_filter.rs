use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

use crate::error::ValidationErrors;
use crate::model::{
    Condition, Entry, EntryData, EntrySearchCriteria, FilterOp, Id, Model, SearchCriteria,
    SortDirection, SortKey,
};

/// Queryable attributes of a record kind. Every backend checks criteria
/// against the same table, so a criteria is accepted or rejected uniformly.
#[derive(Debug, Clone, Copy)]
pub struct Columns {
    pub sortable: &'static [&'static str],
    /// Top-level attributes a custom filter may target
    pub filterable: &'static [&'static str],
    /// Filterable attributes compared as integers
    pub integer: &'static [&'static str],
    /// Whether unknown filter keys fall through to the JSON data document
    pub has_document: bool,
}

pub const MODEL_COLUMNS: Columns = Columns {
    sortable: &["id", "name", "slug", "creator_id", "created_at", "updated_at"],
    filterable: &["name", "slug", "creator_id"],
    integer: &["creator_id"],
    has_document: false,
};

pub const ENTRY_COLUMNS: Columns = Columns {
    sortable: &["id", "name", "model_id", "creator_id", "created_at", "updated_at"],
    filterable: &["name", "creator_id"],
    integer: &["creator_id"],
    has_document: true,
};

impl Columns {
    pub fn is_column(&self, key: &str) -> bool {
        self.filterable.contains(&key)
    }

    pub fn is_integer(&self, key: &str) -> bool {
        self.integer.contains(&key)
    }
}

/// Reject sort keys and custom filters the record kind cannot evaluate
pub fn check_criteria(criteria: &SearchCriteria, columns: &Columns) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    for key in criteria.sort() {
        if !columns.sortable.contains(&key.field.as_str()) {
            errors.add("sort", format!("cannot sort by '{}'", key.field));
        }
    }

    for (key, conditions) in criteria.custom_filters() {
        if !columns.is_column(key) && !columns.has_document {
            errors.add(format!("filter.{}", key), "unknown filter attribute");
            continue;
        }
        if columns.is_integer(key) {
            for condition in conditions {
                if condition.op != FilterOp::Exists && condition.value.trim().parse::<i64>().is_err() {
                    errors.add(format!("filter.{}", key), "must be an integer");
                }
            }
        }
    }

    errors.into_result()
}

/// Requested order plus an `id` tiebreak; `created_at DESC, id ASC` by default
pub fn effective_sort(sort: &[SortKey]) -> Vec<SortKey> {
    if sort.is_empty() {
        return vec![SortKey::desc("created_at"), SortKey::asc("id")];
    }
    let mut sort = sort.to_vec();
    if !sort.iter().any(|key| key.field == "id") {
        sort.push(SortKey::asc("id"));
    }
    sort
}

/// `^-?[0-9]+(\.[0-9]+)?$`, the same test the SQL backend applies
pub fn is_plain_number(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    let all_digits = |p: &str| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit());
    all_digits(int_part) && frac_part.map_or(true, all_digits)
}

/// Text form of a scalar JSON value; arrays and objects have none and so
/// never satisfy a comparison
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(_) | Value::Object(_) => None,
        other => text_form(other),
    }
}

/// Text form of a stored JSON value, as the SQL `->>` operator yields it
pub fn text_form(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortValue {
    Null,
    Int(i64),
    Time(DateTime<Utc>),
    Text(String),
}

/// A record the in-memory evaluator can filter and sort
pub trait Filterable {
    fn record_id(&self) -> Id;
    fn created(&self) -> DateTime<Utc>;
    fn updated(&self) -> DateTime<Utc>;
    /// Top-level attribute as JSON
    fn column(&self, name: &str) -> Option<Value>;
    fn document(&self) -> Option<&EntryData>;
    fn matches_text(&self, needle_lower: &str) -> bool;
    fn sort_value(&self, field: &str) -> SortValue;
}

impl Filterable for Model {
    fn record_id(&self) -> Id {
        self.id
    }

    fn created(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn column(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::from(self.name.clone())),
            "slug" => Some(Value::from(self.slug.clone())),
            "creator_id" => Some(Value::from(self.creator_id)),
            _ => None,
        }
    }

    fn document(&self) -> Option<&EntryData> {
        None
    }

    fn matches_text(&self, needle_lower: &str) -> bool {
        self.name.to_lowercase().contains(needle_lower)
            || self.slug.to_lowercase().contains(needle_lower)
    }

    fn sort_value(&self, field: &str) -> SortValue {
        match field {
            "id" => SortValue::Int(self.id),
            "name" => SortValue::Text(self.name.clone()),
            "slug" => SortValue::Text(self.slug.clone()),
            "creator_id" => SortValue::Int(self.creator_id),
            "created_at" => SortValue::Time(self.created_at),
            "updated_at" => SortValue::Time(self.updated_at),
            _ => SortValue::Null,
        }
    }
}

impl Filterable for Entry {
    fn record_id(&self) -> Id {
        self.id
    }

    fn created(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn column(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::from(self.name.clone())),
            "creator_id" => Some(Value::from(self.creator_id)),
            _ => None,
        }
    }

    fn document(&self) -> Option<&EntryData> {
        Some(&self.data)
    }

    fn matches_text(&self, needle_lower: &str) -> bool {
        self.name.to_lowercase().contains(needle_lower)
            || self.data.values().any(|value| match value {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => text_form(value)
                    .map(|text| text.to_lowercase().contains(needle_lower))
                    .unwrap_or(false),
                _ => false,
            })
    }

    fn sort_value(&self, field: &str) -> SortValue {
        match field {
            "id" => SortValue::Int(self.id),
            "name" => SortValue::Text(self.name.clone()),
            "model_id" => SortValue::Int(self.model_id),
            "creator_id" => SortValue::Int(self.creator_id),
            "created_at" => SortValue::Time(self.created_at),
            "updated_at" => SortValue::Time(self.updated_at),
            _ => SortValue::Null,
        }
    }
}

/// In-memory evaluation of a criteria's predicate set
pub struct RecordFilter;

impl RecordFilter {
    pub fn matches<R: Filterable>(record: &R, criteria: &SearchCriteria, columns: &Columns) -> bool {
        if let Some(ids) = criteria.ids() {
            if !ids.contains(&record.record_id()) {
                return false;
            }
        }

        if let Some(query) = criteria.search_query() {
            if !record.matches_text(&query.to_lowercase()) {
                return false;
            }
        }

        if !criteria.created().contains(record.created())
            || !criteria.updated().contains(record.updated())
        {
            return false;
        }

        criteria.custom_filters().iter().all(|(key, conditions)| {
            let actual = if columns.is_column(key) {
                record.column(key)
            } else {
                record.document().and_then(|doc| doc.get(key).cloned())
            };
            let integer = columns.is_integer(key);
            conditions
                .iter()
                .all(|condition| Self::evaluate(actual.as_ref(), condition, integer))
        })
    }

    pub fn matches_entry(entry: &Entry, criteria: &EntrySearchCriteria) -> bool {
        if let Some(model_id) = criteria.model_id() {
            if entry.model_id != model_id {
                return false;
            }
        }
        Self::matches(entry, criteria.criteria(), &ENTRY_COLUMNS)
    }

    /// Evaluate one condition against a stored value
    pub fn evaluate(actual: Option<&Value>, condition: &Condition, integer: bool) -> bool {
        if condition.op == FilterOp::Exists {
            let present = actual.map_or(false, |value| !value.is_null());
            return present == condition.wants_presence();
        }
        let Some(text) = actual.and_then(scalar_text) else {
            return false;
        };

        if integer {
            let (Ok(left), Ok(right)) = (text.parse::<i64>(), condition.value.trim().parse::<i64>())
            else {
                return false;
            };
            return Self::apply(condition.op, left.cmp(&right));
        }

        match condition.op {
            FilterOp::Eq => text == condition.value,
            FilterOp::Ne => text != condition.value,
            _ if is_plain_number(&condition.value) => {
                if !is_plain_number(&text) {
                    return false;
                }
                match (text.parse::<f64>(), condition.value.parse::<f64>()) {
                    (Ok(left), Ok(right)) => left
                        .partial_cmp(&right)
                        .map(|ordering| Self::apply(condition.op, ordering))
                        .unwrap_or(false),
                    _ => false,
                }
            }
            _ => Self::apply(condition.op, text.as_str().cmp(condition.value.as_str())),
        }
    }

    fn apply(op: FilterOp, ordering: Ordering) -> bool {
        match op {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Ne => ordering != Ordering::Equal,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Gte => ordering != Ordering::Less,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Lte => ordering != Ordering::Greater,
            FilterOp::Exists => false,
        }
    }

    /// Order records by the effective sort of a criteria
    pub fn sort<R: Filterable>(records: &mut [R], sort: &[SortKey]) {
        let sort = effective_sort(sort);
        records.sort_by(|a, b| {
            for key in &sort {
                let ordering = a.sort_value(&key.field).cmp(&b.sort_value(&key.field));
                let ordering = match key.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }
}
