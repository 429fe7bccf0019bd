use itertools::Itertools;
use std::collections::BTreeMap;

use crate::error::ValidationErrors;
use crate::model::{ParamValue, QuerySpec, SortKey, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

/// How malformed `filter` shapes are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Degrade to an empty filter set
    #[default]
    Lenient,
    /// Reject with a validation error
    Strict,
}

/// Turns raw query-string pairs into a normalized `QuerySpec`
#[derive(Debug, Clone, Copy)]
pub struct QueryParser {
    mode: ParseMode,
    default_limit: u32,
    max_limit: u32,
}

impl Default for QueryParser {
    fn default() -> Self {
        Self {
            mode: ParseMode::Lenient,
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: MAX_PAGE_LIMIT,
        }
    }
}

impl QueryParser {
    pub fn new(mode: ParseMode, default_limit: u32, max_limit: u32) -> Self {
        let max_limit = max_limit.clamp(1, MAX_PAGE_LIMIT);
        Self {
            mode,
            default_limit: default_limit.clamp(1, max_limit),
            max_limit,
        }
    }

    pub fn strict() -> Self {
        Self {
            mode: ParseMode::Strict,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    /// Parse decoded `(key, value)` pairs, e.g. from `?page=2&filter[price][gt]=10`.
    /// Only fails in strict mode.
    pub fn parse(&self, pairs: &[(String, String)]) -> Result<QuerySpec, ValidationErrors> {
        let params = build_param_tree(pairs);
        let scalar = |key: &str| params.get(key).and_then(ParamValue::as_str);

        let page = scalar("page")
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|page| *page >= 1)
            .map(|page| page.min(i64::from(u32::MAX)) as u32)
            .unwrap_or(1);

        let limit = match scalar("limit")
            .or_else(|| scalar("per_page"))
            .and_then(|raw| raw.trim().parse::<i64>().ok())
        {
            Some(limit) if limit < 1 => self.default_limit,
            Some(limit) if limit > i64::from(self.max_limit) => self.max_limit,
            Some(limit) => limit as u32,
            None => self.default_limit,
        };

        let q = scalar("q")
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);

        let sort = scalar("sort").map(parse_sort).unwrap_or_default();

        let filter = match params.get("filter") {
            None => BTreeMap::new(),
            Some(ParamValue::Map(map)) => map.clone(),
            Some(ParamValue::Scalar(s)) if s.trim().is_empty() => BTreeMap::new(),
            Some(_) => match self.mode {
                ParseMode::Lenient => {
                    log::debug!("Ignoring malformed filter parameter");
                    BTreeMap::new()
                }
                ParseMode::Strict => {
                    return Err(ValidationErrors::single(
                        "filter",
                        "must be a map such as filter[key]=value",
                    ))
                }
            },
        };

        let fields = scalar("fields")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .unique()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let request_id = scalar("request_id")
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Ok(QuerySpec {
            page,
            limit,
            q,
            sort,
            filter,
            fields,
            request_id,
        })
    }
}

/// `-created_at,name` -> [created_at DESC, name ASC]. A repeated field keeps
/// its first position and takes the last direction.
fn parse_sort(raw: &str) -> Vec<SortKey> {
    let mut sort: Vec<SortKey> = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let key = match item.strip_prefix('-') {
            Some(field) => SortKey::desc(field.trim()),
            None => SortKey::asc(item),
        };
        if key.field.is_empty() {
            continue;
        }
        match sort.iter_mut().find(|existing| existing.field == key.field) {
            Some(existing) => existing.direction = key.direction,
            None => sort.push(key),
        }
    }
    sort
}

fn build_param_tree(pairs: &[(String, String)]) -> BTreeMap<String, ParamValue> {
    let mut params: BTreeMap<String, ParamValue> = BTreeMap::new();
    for (key, value) in pairs {
        let (root, path) = split_key(key);
        if root.is_empty() {
            continue;
        }
        let slot = params
            .entry(root)
            .or_insert_with(|| ParamValue::Scalar(String::new()));
        assign(slot, &path, value.clone());
    }
    params
}

/// `filter[created_at][gt]` -> ("filter", ["created_at", "gt"]); `ids[]` -> ("ids", [""])
fn split_key(key: &str) -> (String, Vec<String>) {
    let Some(open) = key.find('[') else {
        return (key.to_string(), Vec::new());
    };

    let root = key[..open].to_string();
    let mut path = Vec::new();
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            // Unbalanced brackets: keep the key literally
            return (key.to_string(), Vec::new());
        };
        path.push(stripped[..close].to_string());
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        return (key.to_string(), Vec::new());
    }
    (root, path)
}

fn assign(slot: &mut ParamValue, path: &[String], value: String) {
    match path.split_first() {
        None => *slot = ParamValue::Scalar(value),
        Some((head, rest)) if head.is_empty() => {
            if !matches!(slot, ParamValue::List(_)) {
                *slot = ParamValue::List(Vec::new());
            }
            if let ParamValue::List(items) = slot {
                let mut child = ParamValue::Scalar(String::new());
                assign(&mut child, rest, value);
                items.push(child);
            }
        }
        Some((head, rest)) => {
            if !matches!(slot, ParamValue::Map(_)) {
                *slot = ParamValue::Map(BTreeMap::new());
            }
            if let ParamValue::Map(map) = slot {
                let child = map
                    .entry(head.clone())
                    .or_insert_with(|| ParamValue::Scalar(String::new()));
                assign(child, rest, value);
            }
        }
    }
}
