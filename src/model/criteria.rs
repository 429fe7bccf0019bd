use crate::error::ValidationErrors;
use crate::model::{parse_timestamp, Id, ParamValue, QuerySpec, SortKey};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Deref;

/// Filter keys with a dedicated meaning; everything else is a custom filter
pub const RESERVED_FILTER_KEYS: [&str; 5] = ["q", "model_id", "ids", "created_at", "updated_at"];

/// Comparison applied by a custom (virtual column) filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Value is "true"/"1" for presence, anything else for absence
    Exists,
}

impl FilterOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "eq" => Some(FilterOp::Eq),
            "ne" => Some(FilterOp::Ne),
            "gt" => Some(FilterOp::Gt),
            "gte" => Some(FilterOp::Gte),
            "lt" => Some(FilterOp::Lt),
            "lte" => Some(FilterOp::Lte),
            "exists" => Some(FilterOp::Exists),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Condition {
    pub op: FilterOp,
    pub value: String,
}

impl Condition {
    pub fn eq(value: impl Into<String>) -> Self {
        Self {
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn new(op: FilterOp, value: impl Into<String>) -> Self {
        Self {
            op,
            value: value.into(),
        }
    }

    /// For `Exists`: whether presence (true) or absence (false) is requested
    pub fn wants_presence(&self) -> bool {
        matches!(self.value.trim(), "1" | "true" | "yes")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bound {
    pub at: DateTime<Utc>,
    pub inclusive: bool,
}

/// Timestamp window; `gt`/`lt` are exclusive, `gte`/`lte` inclusive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub after: Option<Bound>,
    pub before: Option<Bound>,
}

impl TimeRange {
    pub fn is_unbounded(&self) -> bool {
        self.after.is_none() && self.before.is_none()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        let after_ok = match self.after {
            Some(b) if b.inclusive => ts >= b.at,
            Some(b) => ts > b.at,
            None => true,
        };
        let before_ok = match self.before {
            Some(b) if b.inclusive => ts <= b.at,
            Some(b) => ts < b.at,
            None => true,
        };
        after_ok && before_ok
    }
}

/// Typed filter/sort/projection for a model list query.
/// Built once per request and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchCriteria {
    search_query: Option<String>,
    ids: Option<Vec<Id>>,
    created: TimeRange,
    updated: TimeRange,
    custom_filters: BTreeMap<String, Vec<Condition>>,
    selected_fields: Option<Vec<String>>,
    sort: Vec<SortKey>,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build criteria for the models listing from a parsed query
    pub fn from_query(spec: &QuerySpec) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let criteria = Self::from_query_collecting(spec, &mut errors);
        errors.into_result().map(|_| criteria)
    }

    fn from_query_collecting(spec: &QuerySpec, errors: &mut ValidationErrors) -> Self {
        let filters = &spec.filter;
        let mut criteria = SearchCriteria::new();

        let query = spec
            .q
            .clone()
            .or_else(|| filters.get("q").and_then(ParamValue::as_str).map(str::to_string));
        if let Some(q) = query {
            criteria = criteria.search(q);
        }

        if let Some(raw) = filters.get("ids") {
            match parse_ids(raw) {
                Ok(Some(ids)) => criteria = criteria.with_ids(ids),
                Ok(None) => {}
                Err(message) => errors.add("filter.ids", message),
            }
        }

        criteria.created = parse_range(filters.get("created_at"), "filter.created_at", errors);
        criteria.updated = parse_range(filters.get("updated_at"), "filter.updated_at", errors);

        for (key, value) in filters {
            if RESERVED_FILTER_KEYS.contains(&key.as_str()) {
                continue;
            }
            match value {
                ParamValue::Scalar(s) => {
                    criteria = criteria.with_custom_filter(key.clone(), Condition::eq(s.clone()));
                }
                ParamValue::Map(ops) => {
                    for (op_name, op_value) in ops {
                        let Some(op) = FilterOp::parse(op_name) else {
                            errors.add(
                                format!("filter.{}.{}", key, op_name),
                                "unsupported filter operator",
                            );
                            continue;
                        };
                        match op_value.as_str() {
                            Some(v) => {
                                criteria = criteria
                                    .with_custom_filter(key.clone(), Condition::new(op, v.to_string()))
                            }
                            None => errors.add(
                                format!("filter.{}.{}", key, op_name),
                                "operator value must be a single value",
                            ),
                        }
                    }
                }
                ParamValue::List(_) => {
                    log::debug!("Ignoring list-valued custom filter '{}'", key);
                }
            }
        }

        if !spec.fields.is_empty() {
            criteria = criteria.select_fields(spec.fields.iter().cloned());
        }

        criteria.sort_by(spec.sort.clone())
    }

    pub fn search(mut self, query: impl Into<String>) -> Self {
        let query = query.into().trim().to_string();
        self.search_query = if query.is_empty() { None } else { Some(query) };
        self
    }

    /// Restrict to an explicit id allow-list (AND-combined with every other filter)
    pub fn with_ids(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        let mut ids: Vec<Id> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        self.ids = Some(ids);
        self
    }

    pub fn created_after(mut self, at: DateTime<Utc>) -> Self {
        self.created.after = Some(Bound { at, inclusive: false });
        self
    }

    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created.before = Some(Bound { at, inclusive: false });
        self
    }

    pub fn updated_after(mut self, at: DateTime<Utc>) -> Self {
        self.updated.after = Some(Bound { at, inclusive: false });
        self
    }

    pub fn updated_before(mut self, at: DateTime<Utc>) -> Self {
        self.updated.before = Some(Bound { at, inclusive: false });
        self
    }

    pub fn with_custom_filter(mut self, key: impl Into<String>, condition: Condition) -> Self {
        self.custom_filters.entry(key.into()).or_default().push(condition);
        self
    }

    /// Restrict the returned attributes; `id` is always included
    pub fn select_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        let mut selected = vec!["id".to_string()];
        for field in fields {
            let field = field.into();
            if !field.is_empty() && !selected.contains(&field) {
                selected.push(field);
            }
        }
        self.selected_fields = Some(selected);
        self
    }

    pub fn sort_by(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    pub fn search_query(&self) -> Option<&str> {
        self.search_query.as_deref()
    }

    pub fn ids(&self) -> Option<&[Id]> {
        self.ids.as_deref()
    }

    pub fn created(&self) -> &TimeRange {
        &self.created
    }

    pub fn updated(&self) -> &TimeRange {
        &self.updated
    }

    pub fn custom_filters(&self) -> &BTreeMap<String, Vec<Condition>> {
        &self.custom_filters
    }

    pub fn selected_fields(&self) -> Option<&[String]> {
        self.selected_fields.as_deref()
    }

    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }
}

/// Entry flavor of the criteria: the same shape plus an optional model scope
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntrySearchCriteria {
    model_id: Option<Id>,
    #[serde(flatten)]
    criteria: SearchCriteria,
}

impl EntrySearchCriteria {
    pub fn new(criteria: SearchCriteria) -> Self {
        Self {
            model_id: None,
            criteria,
        }
    }

    pub fn from_query(spec: &QuerySpec) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let criteria = SearchCriteria::from_query_collecting(spec, &mut errors);

        let model_id = match spec.filter.get("model_id") {
            None => None,
            Some(ParamValue::Scalar(raw)) => match raw.trim().parse::<Id>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add("filter.model_id", "must be an integer");
                    None
                }
            },
            Some(_) => {
                errors.add("filter.model_id", "must be a single value");
                None
            }
        };

        errors.into_result().map(|_| Self { model_id, criteria })
    }

    pub fn for_model(mut self, model_id: Id) -> Self {
        self.model_id = Some(model_id);
        self
    }

    pub fn model_id(&self) -> Option<Id> {
        self.model_id
    }

    pub fn criteria(&self) -> &SearchCriteria {
        &self.criteria
    }
}

impl Deref for EntrySearchCriteria {
    type Target = SearchCriteria;

    fn deref(&self) -> &Self::Target {
        &self.criteria
    }
}

impl From<SearchCriteria> for EntrySearchCriteria {
    fn from(criteria: SearchCriteria) -> Self {
        Self::new(criteria)
    }
}

fn parse_ids(raw: &ParamValue) -> Result<Option<Vec<Id>>, String> {
    let tokens: Vec<&str> = match raw {
        ParamValue::Scalar(s) => s.split(',').collect(),
        ParamValue::List(items) => items.iter().filter_map(ParamValue::as_str).collect(),
        ParamValue::Map(_) => return Err("must be a comma-separated list of ids".to_string()),
    };

    let mut ids = Vec::new();
    for token in tokens.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        match token.parse::<Id>() {
            Ok(id) => ids.push(id),
            Err(_) => return Err(format!("'{}' is not a valid id", token)),
        }
    }

    Ok(if ids.is_empty() { None } else { Some(ids) })
}

fn parse_range(raw: Option<&ParamValue>, key: &str, errors: &mut ValidationErrors) -> TimeRange {
    let mut range = TimeRange::default();
    let Some(raw) = raw else {
        return range;
    };
    let Some(ops) = raw.as_map() else {
        errors.add(key, "expects a range such as [gt]=2024-01-01");
        return range;
    };

    for (op, value) in ops {
        let Some(at) = value.as_str().and_then(parse_timestamp) else {
            errors.add(format!("{}.{}", key, op), "must be a date or timestamp");
            continue;
        };
        match op.as_str() {
            "gt" => range.after = Some(Bound { at, inclusive: false }),
            "gte" => range.after = Some(Bound { at, inclusive: true }),
            "lt" => range.before = Some(Bound { at, inclusive: false }),
            "lte" => range.before = Some(Bound { at, inclusive: true }),
            _ => errors.add(format!("{}.{}", key, op), "unsupported range operator"),
        }
    }
    range
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::QueryParser;

    fn spec(pairs: &[(&str, &str)]) -> QuerySpec {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        QueryParser::default().parse(&pairs).unwrap()
    }

    #[test]
    fn test_reserved_keys_are_typed() {
        let criteria = EntrySearchCriteria::from_query(&spec(&[
            ("q", "apple"),
            ("filter[model_id]", "5"),
            ("filter[ids]", "3, 1,2"),
            ("filter[created_at][gt]", "2024-01-01"),
            ("filter[updated_at][lte]", "2024-02-01 10:00:00"),
        ]))
        .unwrap();

        assert_eq!(criteria.model_id(), Some(5));
        assert_eq!(criteria.search_query(), Some("apple"));
        assert_eq!(criteria.ids(), Some(&[1, 2, 3][..]));
        assert!(criteria.created().after.is_some());
        assert!(criteria.created().before.is_none());
        assert!(criteria.updated().before.unwrap().inclusive);
        assert!(criteria.custom_filters().is_empty());
    }

    #[test]
    fn test_remaining_keys_become_custom_filters() {
        let criteria = SearchCriteria::from_query(&spec(&[
            ("filter[status]", "published"),
            ("filter[price][gt]", "10"),
            ("filter[price][lt]", "20"),
        ]))
        .unwrap();

        let filters = criteria.custom_filters();
        assert_eq!(filters["status"], vec![Condition::eq("published")]);
        assert_eq!(
            filters["price"],
            vec![
                Condition::new(FilterOp::Gt, "10"),
                Condition::new(FilterOp::Lt, "20")
            ]
        );
    }

    #[test]
    fn test_filter_q_used_when_top_level_absent() {
        let criteria = SearchCriteria::from_query(&spec(&[("filter[q]", "beta")])).unwrap();
        assert_eq!(criteria.search_query(), Some("beta"));
    }

    #[test]
    fn test_projection_always_includes_id() {
        let criteria = SearchCriteria::new().select_fields(["name", "slug", "name"]);
        assert_eq!(
            criteria.selected_fields().unwrap(),
            &["id".to_string(), "name".to_string(), "slug".to_string()]
        );
    }

    #[test]
    fn test_malformed_reserved_values_are_validation_errors() {
        let err = EntrySearchCriteria::from_query(&spec(&[
            ("filter[model_id]", "five"),
            ("filter[created_at][gt]", "not-a-date"),
            ("filter[ids]", "1,x"),
        ]))
        .unwrap_err();

        assert!(err.contains_key("filter.model_id"));
        assert!(err.contains_key("filter.created_at.gt"));
        assert!(err.contains_key("filter.ids"));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err =
            SearchCriteria::from_query(&spec(&[("filter[price][between]", "1")])).unwrap_err();
        assert!(err.contains_key("filter.price.between"));
    }

    #[test]
    fn test_time_range_bounds() {
        let at = parse_timestamp("2024-01-01").unwrap();
        let exclusive = TimeRange {
            after: Some(Bound { at, inclusive: false }),
            before: None,
        };
        let inclusive = TimeRange {
            after: Some(Bound { at, inclusive: true }),
            before: None,
        };
        assert!(!exclusive.contains(at));
        assert!(inclusive.contains(at));
    }
}
