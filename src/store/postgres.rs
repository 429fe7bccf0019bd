use anyhow::Context;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::error::{EngineError, Result, StorageContext};
use crate::logic::record_filter::{
    check_criteria, effective_sort, is_plain_number, Columns, ENTRY_COLUMNS, MODEL_COLUMNS,
};
use crate::model::{
    slug_candidate, slugify, ActorId, Condition, Entry, EntryChanges, EntryData,
    EntrySearchCriteria, FieldDef, FilterOp, Id, Model, ModelChanges, NewEntry, NewModel,
    Pagination, SchemaSnapshot, SearchCriteria, SortDirection, SortKey, TimeRange,
};
use crate::store::traits::{EntryStore, ModelStore};

const MODEL_SELECT: &str = "SELECT m.id, m.name, m.slug, m.creator_id, m.current_schema_id, \
     s.fields, m.created_at, m.updated_at, m.deleted_at \
     FROM models m JOIN model_schemas s ON s.id = m.current_schema_id";

const ENTRY_SELECT: &str = "SELECT e.id, e.model_id, e.name, e.data, e.creator_id, \
     e.created_at, e.updated_at, e.deleted_at FROM entries e";

const SNAPSHOT_SELECT: &str =
    "SELECT id, model_id, fields, creator_id, created_at FROM model_schemas";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// First free slug among `base`, `base-2`, `base-3`, ...
    async fn unique_slug(&self, base: &str) -> Result<String> {
        let taken: Vec<String> =
            sqlx::query_scalar("SELECT slug FROM models WHERE slug = $1 OR slug LIKE $2")
                .bind(base)
                .bind(format!("{}-%", escape_like(base)))
                .fetch_all(&self.pool)
                .await
                .storage_context("Failed to look up slugs")?;

        let mut attempt = 1;
        loop {
            let candidate = slug_candidate(base, attempt);
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
            attempt += 1;
        }
    }
}

/// Which SQL expression a custom filter compares against
enum Operand<'a> {
    Column(String),
    Document(&'a str),
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn column_sql(alias: &str, column: &str) -> String {
    format!("{}.{}", alias, column)
}

/// With `scalar_only` a document key holding an array or object reads as NULL,
/// so comparisons only ever see scalar text
fn push_operand(qb: &mut QueryBuilder<'_, Postgres>, operand: &Operand<'_>, scalar_only: bool) {
    match operand {
        Operand::Column(column) => {
            qb.push(column);
        }
        Operand::Document(key) if scalar_only => {
            qb.push("(CASE WHEN jsonb_typeof(e.data -> ")
                .push_bind(key.to_string())
                .push(") IN ('string', 'number', 'boolean') THEN e.data ->> ")
                .push_bind(key.to_string())
                .push(" END)");
        }
        Operand::Document(key) => {
            qb.push("(e.data ->> ").push_bind(key.to_string()).push(")");
        }
    }
}

fn comparison(op: FilterOp) -> &'static str {
    match op {
        FilterOp::Eq => " = ",
        FilterOp::Ne => " <> ",
        FilterOp::Gt => " > ",
        FilterOp::Gte => " >= ",
        FilterOp::Lt => " < ",
        FilterOp::Lte => " <= ",
        FilterOp::Exists => " IS NOT NULL",
    }
}

/// One condition over a text-valued expression: equality on the text form,
/// numeric ordering when the operand is numeric, byte-wise text ordering otherwise
fn push_text_condition(
    qb: &mut QueryBuilder<'_, Postgres>,
    operand: &Operand<'_>,
    condition: &Condition,
) {
    match condition.op {
        FilterOp::Exists => {
            push_operand(qb, operand, false);
            qb.push(if condition.wants_presence() {
                " IS NOT NULL"
            } else {
                " IS NULL"
            });
        }
        FilterOp::Eq | FilterOp::Ne => {
            push_operand(qb, operand, true);
            qb.push(comparison(condition.op))
                .push_bind(condition.value.clone());
        }
        op if is_plain_number(&condition.value) => {
            qb.push("(CASE WHEN ");
            push_operand(qb, operand, true);
            qb.push(" ~ '^-?[0-9]+(\\.[0-9]+)?$' THEN (");
            push_operand(qb, operand, true);
            qb.push(")::numeric END)")
                .push(comparison(op))
                .push_bind(condition.value.clone())
                .push("::numeric");
        }
        op => {
            push_operand(qb, operand, true);
            qb.push(" COLLATE \"C\"")
                .push(comparison(op))
                .push_bind(condition.value.clone());
        }
    }
}

fn push_integer_condition(qb: &mut QueryBuilder<'_, Postgres>, column: &str, condition: &Condition) {
    if condition.op == FilterOp::Exists {
        qb.push(if condition.wants_presence() { "TRUE" } else { "FALSE" });
        return;
    }
    // check_criteria has already rejected non-integer values
    let value = condition.value.trim().parse::<i64>().unwrap_or_default();
    qb.push(column).push(comparison(condition.op)).push_bind(value);
}

fn push_range(qb: &mut QueryBuilder<'_, Postgres>, column: &str, range: &TimeRange) {
    if let Some(bound) = range.after {
        qb.push(" AND ")
            .push(column)
            .push(if bound.inclusive { " >= " } else { " > " })
            .push_bind(bound.at);
    }
    if let Some(bound) = range.before {
        qb.push(" AND ")
            .push(column)
            .push(if bound.inclusive { " <= " } else { " < " })
            .push_bind(bound.at);
    }
}

/// Predicates common to both record kinds. `alias` is the table alias.
fn push_common_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    alias: &str,
    criteria: &SearchCriteria,
    columns: &Columns,
) {
    qb.push(" WHERE ")
        .push(column_sql(alias, "deleted_at"))
        .push(" IS NULL");

    if let Some(ids) = criteria.ids() {
        qb.push(" AND ")
            .push(column_sql(alias, "id"))
            .push(" = ANY(")
            .push_bind(ids.to_vec())
            .push(")");
    }

    push_range(qb, &column_sql(alias, "created_at"), criteria.created());
    push_range(qb, &column_sql(alias, "updated_at"), criteria.updated());

    for (key, conditions) in criteria.custom_filters() {
        for condition in conditions {
            qb.push(" AND ");
            if columns.is_integer(key) {
                push_integer_condition(qb, &column_sql(alias, key), condition);
                continue;
            }
            let operand = if columns.is_column(key) {
                Operand::Column(column_sql(alias, key))
            } else {
                Operand::Document(key)
            };
            push_text_condition(qb, &operand, condition);
        }
    }
}

/// The one predicate builder behind both `count_models` and `list_models`
fn push_model_filters(qb: &mut QueryBuilder<'_, Postgres>, criteria: &SearchCriteria) {
    push_common_filters(qb, "m", criteria, &MODEL_COLUMNS);

    if let Some(query) = criteria.search_query() {
        let pattern = format!("%{}%", escape_like(query));
        qb.push(" AND (m.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR m.slug ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// The one predicate builder behind both `count_entries` and `list_entries`
fn push_entry_filters(qb: &mut QueryBuilder<'_, Postgres>, criteria: &EntrySearchCriteria) {
    push_common_filters(qb, "e", criteria.criteria(), &ENTRY_COLUMNS);

    if let Some(model_id) = criteria.model_id() {
        qb.push(" AND e.model_id = ").push_bind(model_id);
    }

    if let Some(query) = criteria.search_query() {
        let pattern = format!("%{}%", escape_like(query));
        qb.push(" AND (e.name ILIKE ")
            .push_bind(pattern.clone())
            .push(
                " OR EXISTS (SELECT 1 FROM jsonb_each(e.data) AS kv \
                 WHERE jsonb_typeof(kv.value) IN ('string', 'number', 'boolean') \
                 AND kv.value #>> '{}' ILIKE ",
            )
            .push_bind(pattern)
            .push("))");
    }
}

fn push_order_and_page(
    qb: &mut QueryBuilder<'_, Postgres>,
    alias: &str,
    sort: &[SortKey],
    page: Pagination,
) {
    qb.push(" ORDER BY ");
    {
        let mut separated = qb.separated(", ");
        for key in effective_sort(sort) {
            let collate = if matches!(key.field.as_str(), "name" | "slug") {
                " COLLATE \"C\""
            } else {
                ""
            };
            let direction = match key.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            separated.push(format!("{}.{}{} {}", alias, key.field, collate, direction));
        }
    }
    qb.push(" LIMIT ")
        .push_bind(i64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(page.offset() as i64);
}

fn model_count_query(criteria: &SearchCriteria) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM models m");
    push_model_filters(&mut qb, criteria);
    qb
}

fn model_page_query(criteria: &SearchCriteria, page: Pagination) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(MODEL_SELECT);
    push_model_filters(&mut qb, criteria);
    push_order_and_page(&mut qb, "m", criteria.sort(), page);
    qb
}

fn entry_count_query(criteria: &EntrySearchCriteria) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM entries e");
    push_entry_filters(&mut qb, criteria);
    qb
}

fn entry_page_query(
    criteria: &EntrySearchCriteria,
    page: Pagination,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(ENTRY_SELECT);
    push_entry_filters(&mut qb, criteria);
    push_order_and_page(&mut qb, "e", criteria.sort(), page);
    qb
}

fn model_from_row(row: &PgRow) -> std::result::Result<Model, sqlx::Error> {
    let fields: Json<Vec<FieldDef>> = row.try_get("fields")?;
    Ok(Model {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        creator_id: row.try_get("creator_id")?,
        current_schema_id: row.try_get("current_schema_id")?,
        fields: fields.0,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> std::result::Result<Entry, sqlx::Error> {
    let data: Json<EntryData> = row.try_get("data")?;
    Ok(Entry {
        id: row.try_get("id")?,
        model_id: row.try_get("model_id")?,
        name: row.try_get("name")?,
        data: data.0,
        creator_id: row.try_get("creator_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn snapshot_from_row(row: &PgRow) -> std::result::Result<SchemaSnapshot, sqlx::Error> {
    let fields: Json<Vec<FieldDef>> = row.try_get("fields")?;
    Ok(SchemaSnapshot {
        id: row.try_get("id")?,
        model_id: row.try_get("model_id")?,
        fields: fields.0,
        creator_id: row.try_get("creator_id")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait::async_trait]
impl ModelStore for PostgresStore {
    async fn count_models(&self, criteria: &SearchCriteria) -> Result<u64> {
        check_criteria(criteria, &MODEL_COLUMNS)?;
        let mut query = model_count_query(criteria);
        let count: i64 = query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .storage_context("Failed to count models")?;
        Ok(count.max(0) as u64)
    }

    async fn list_models(&self, page: Pagination, criteria: &SearchCriteria) -> Result<Vec<Model>> {
        check_criteria(criteria, &MODEL_COLUMNS)?;
        let mut query = model_page_query(criteria, page);
        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .storage_context("Failed to list models")?;

        rows.iter()
            .map(model_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .storage_context("Failed to decode model row")
    }

    async fn get_model(&self, id: Id, include_deleted: bool) -> Result<Option<Model>> {
        let sql = format!(
            "{} WHERE m.id = $1 AND ($2 OR m.deleted_at IS NULL)",
            MODEL_SELECT
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(include_deleted)
            .fetch_optional(&self.pool)
            .await
            .storage_context("Failed to fetch model")?;

        row.as_ref()
            .map(model_from_row)
            .transpose()
            .storage_context("Failed to decode model row")
    }

    async fn insert_model(&self, model: NewModel, actor: ActorId) -> Result<Id> {
        let slug = match model.slug {
            Some(slug) => slug,
            None => self.unique_slug(&slugify(&model.name)).await?,
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .storage_context("Failed to begin transaction")?;

        let model_id: Id = sqlx::query_scalar(
            "INSERT INTO models (name, slug, creator_id) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&model.name)
        .bind(&slug)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await
        .storage_context("Failed to insert model")?;

        let snapshot_id: Id = sqlx::query_scalar(
            "INSERT INTO model_schemas (model_id, fields, creator_id) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(model_id)
        .bind(Json(&model.fields))
        .bind(actor)
        .fetch_one(&mut *tx)
        .await
        .storage_context("Failed to insert schema snapshot")?;

        sqlx::query("UPDATE models SET current_schema_id = $1 WHERE id = $2")
            .bind(snapshot_id)
            .bind(model_id)
            .execute(&mut *tx)
            .await
            .storage_context("Failed to point model at its schema")?;

        tx.commit()
            .await
            .storage_context("Failed to commit model insert")?;

        Ok(model_id)
    }

    async fn update_model(&self, id: Id, changes: ModelChanges, actor: ActorId) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .storage_context("Failed to begin transaction")?;

        let live: Option<Id> =
            sqlx::query_scalar("SELECT id FROM models WHERE id = $1 AND deleted_at IS NULL FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .storage_context("Failed to lock model")?;
        if live.is_none() {
            return Ok(false);
        }

        let snapshot_id: Option<Id> = match &changes.fields {
            Some(fields) => Some(
                sqlx::query_scalar(
                    "INSERT INTO model_schemas (model_id, fields, creator_id) VALUES ($1, $2, $3) RETURNING id",
                )
                .bind(id)
                .bind(Json(fields))
                .bind(actor)
                .fetch_one(&mut *tx)
                .await
                .storage_context("Failed to insert schema snapshot")?,
            ),
            None => None,
        };

        sqlx::query(
            r#"
            UPDATE models SET
                name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                current_schema_id = COALESCE($4, current_schema_id),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.slug)
        .bind(snapshot_id)
        .execute(&mut *tx)
        .await
        .storage_context("Failed to update model")?;

        tx.commit()
            .await
            .storage_context("Failed to commit model update")?;

        Ok(true)
    }

    async fn soft_delete_models(&self, ids: &[Id], _actor: ActorId) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .storage_context("Failed to begin transaction")?;

        let result = sqlx::query(
            "UPDATE models SET deleted_at = NOW(), updated_at = NOW() WHERE id = ANY($1) AND deleted_at IS NULL",
        )
        .bind(ids)
        .execute(&mut *tx)
        .await
        .storage_context("Failed to soft delete models")?;

        sqlx::query(
            "UPDATE entries SET deleted_at = NOW(), updated_at = NOW() WHERE model_id = ANY($1) AND deleted_at IS NULL",
        )
        .bind(ids)
        .execute(&mut *tx)
        .await
        .storage_context("Failed to soft delete model entries")?;

        tx.commit()
            .await
            .storage_context("Failed to commit soft delete")?;

        Ok(result.rows_affected())
    }

    async fn purge_models(&self, ids: &[Id]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .storage_context("Failed to begin transaction")?;

        let purgeable: Vec<Id> = sqlx::query_scalar(
            "SELECT id FROM models WHERE id = ANY($1) FOR UPDATE",
        )
        .bind(ids)
        .fetch_all(&mut *tx)
        .await
        .storage_context("Failed to lock models for purge")?;

        if purgeable.is_empty() {
            return Ok(0);
        }

        sqlx::query("DELETE FROM entries WHERE model_id = ANY($1)")
            .bind(&purgeable)
            .execute(&mut *tx)
            .await
            .storage_context("Failed to purge model entries")?;

        sqlx::query("DELETE FROM model_schemas WHERE model_id = ANY($1)")
            .bind(&purgeable)
            .execute(&mut *tx)
            .await
            .storage_context("Failed to purge schema snapshots")?;

        let result = sqlx::query("DELETE FROM models WHERE id = ANY($1)")
            .bind(&purgeable)
            .execute(&mut *tx)
            .await
            .storage_context("Failed to purge models")?;

        tx.commit()
            .await
            .storage_context("Failed to commit purge")?;

        Ok(result.rows_affected())
    }

    async fn get_snapshot(&self, id: Id) -> Result<Option<SchemaSnapshot>> {
        let sql = format!("{} WHERE id = $1", SNAPSHOT_SELECT);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .storage_context("Failed to fetch schema snapshot")?;

        row.as_ref()
            .map(snapshot_from_row)
            .transpose()
            .storage_context("Failed to decode schema snapshot")
    }

    async fn list_snapshots(&self, model_id: Id) -> Result<Vec<SchemaSnapshot>> {
        let sql = format!("{} WHERE model_id = $1 ORDER BY id", SNAPSHOT_SELECT);
        let rows = sqlx::query(&sql)
            .bind(model_id)
            .fetch_all(&self.pool)
            .await
            .storage_context("Failed to list schema snapshots")?;

        rows.iter()
            .map(snapshot_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .storage_context("Failed to decode schema snapshot")
    }

    async fn model_ids_by_creator(
        &self,
        creator: ActorId,
        after: Option<Id>,
        limit: usize,
    ) -> Result<Vec<Id>> {
        sqlx::query_scalar(
            "SELECT id FROM models WHERE creator_id = $1 AND id > $2 ORDER BY id LIMIT $3",
        )
        .bind(creator)
        .bind(after.unwrap_or(0))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .storage_context("Failed to list models by creator")
    }
}

#[async_trait::async_trait]
impl EntryStore for PostgresStore {
    async fn count_entries(&self, criteria: &EntrySearchCriteria) -> Result<u64> {
        check_criteria(criteria, &ENTRY_COLUMNS)?;
        let mut query = entry_count_query(criteria);
        let count: i64 = query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .storage_context("Failed to count entries")?;
        Ok(count.max(0) as u64)
    }

    async fn list_entries(
        &self,
        page: Pagination,
        criteria: &EntrySearchCriteria,
    ) -> Result<Vec<Entry>> {
        check_criteria(criteria, &ENTRY_COLUMNS)?;
        let mut query = entry_page_query(criteria, page);
        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .storage_context("Failed to list entries")?;

        rows.iter()
            .map(entry_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .storage_context("Failed to decode entry row")
    }

    async fn get_entry(&self, id: Id, include_deleted: bool) -> Result<Option<Entry>> {
        let sql = format!(
            "{} WHERE e.id = $1 AND ($2 OR e.deleted_at IS NULL)",
            ENTRY_SELECT
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(include_deleted)
            .fetch_optional(&self.pool)
            .await
            .storage_context("Failed to fetch entry")?;

        row.as_ref()
            .map(entry_from_row)
            .transpose()
            .storage_context("Failed to decode entry row")
    }

    async fn insert_entry(&self, entry: NewEntry, actor: ActorId) -> Result<Id> {
        let mut tx = self
            .pool
            .begin()
            .await
            .storage_context("Failed to begin transaction")?;

        // FOR SHARE blocks a concurrent purge of the model until we commit
        let live: Option<Id> =
            sqlx::query_scalar("SELECT id FROM models WHERE id = $1 AND deleted_at IS NULL FOR SHARE")
                .bind(entry.model_id)
                .fetch_optional(&mut *tx)
                .await
                .storage_context("Failed to check model")?;
        if live.is_none() {
            return Err(EngineError::validation("model_id", "model does not exist"));
        }

        let id: Id = sqlx::query_scalar(
            "INSERT INTO entries (model_id, name, data, creator_id) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(entry.model_id)
        .bind(&entry.name)
        .bind(Json(&entry.data))
        .bind(actor)
        .fetch_one(&mut *tx)
        .await
        .storage_context("Failed to insert entry")?;

        tx.commit()
            .await
            .storage_context("Failed to commit entry insert")?;

        Ok(id)
    }

    async fn update_entry(&self, id: Id, changes: EntryChanges, _actor: ActorId) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .storage_context("Failed to begin transaction")?;

        if let Some(model_id) = changes.model_id {
            let live: Option<Id> = sqlx::query_scalar(
                "SELECT id FROM models WHERE id = $1 AND deleted_at IS NULL FOR SHARE",
            )
            .bind(model_id)
            .fetch_optional(&mut *tx)
            .await
            .storage_context("Failed to check model")?;
            if live.is_none() {
                return Err(EngineError::validation("model_id", "model does not exist"));
            }
        }

        let result = sqlx::query(
            r#"
            UPDATE entries SET
                model_id = COALESCE($2, model_id),
                name = COALESCE($3, name),
                data = COALESCE($4, data),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(changes.model_id)
        .bind(changes.name)
        .bind(changes.data.map(Json))
        .execute(&mut *tx)
        .await
        .storage_context("Failed to update entry")?;

        tx.commit()
            .await
            .storage_context("Failed to commit entry update")?;

        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete_entries(&self, ids: &[Id], _actor: ActorId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE entries SET deleted_at = NOW(), updated_at = NOW() WHERE id = ANY($1) AND deleted_at IS NULL",
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .storage_context("Failed to soft delete entries")?;

        Ok(result.rows_affected())
    }

    async fn purge_entries(&self, ids: &[Id]) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM entries WHERE id = ANY($1)")
                .bind(ids)
                .execute(&self.pool)
                .await
                .storage_context("Failed to purge entries")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn where_clause(sql: &str) -> &str {
        let start = sql.find(" WHERE ").unwrap();
        let end = sql.find(" ORDER BY ").unwrap_or(sql.len());
        &sql[start..end]
    }

    #[test]
    fn test_count_and_page_share_model_predicates() {
        let criteria = SearchCriteria::new()
            .search("alpha")
            .with_ids([3, 1])
            .with_custom_filter("creator_id", Condition::eq("7"))
            .with_custom_filter("name", Condition::new(FilterOp::Ne, "Beta"));

        let count = model_count_query(&criteria);
        let page = model_page_query(&criteria, Pagination::new(2, 10));

        assert_eq!(where_clause(count.sql()), where_clause(page.sql()));
        assert!(count.sql().contains("m.id = ANY($1)"));
        assert!(count.sql().contains("m.creator_id = $2"));
        assert!(count.sql().contains("m.name <> $3"));
        assert!(count.sql().contains("m.name ILIKE $4 OR m.slug ILIKE $5"));
    }

    #[test]
    fn test_count_and_page_share_entry_predicates() {
        let criteria = EntrySearchCriteria::new(
            SearchCriteria::new()
                .search("zebra")
                .with_custom_filter("price", Condition::new(FilterOp::Gt, "10")),
        )
        .for_model(4);

        let count = entry_count_query(&criteria);
        let page = entry_page_query(&criteria, Pagination::new(1, 20));

        assert_eq!(where_clause(count.sql()), where_clause(page.sql()));
        assert!(count.sql().contains("e.deleted_at IS NULL"));
        assert!(count.sql().contains("e.model_id = "));
        assert!(count.sql().contains("::numeric END) > "));
        assert!(count.sql().contains("jsonb_each(e.data)"));
    }

    #[test]
    fn test_text_comparison_uses_byte_order() {
        let criteria = EntrySearchCriteria::new(
            SearchCriteria::new().with_custom_filter("status", Condition::new(FilterOp::Lt, "m")),
        );
        let sql = entry_count_query(&criteria).into_sql();
        assert!(sql.contains(
            "(CASE WHEN jsonb_typeof(e.data -> $1) IN ('string', 'number', 'boolean') \
             THEN e.data ->> $2 END) COLLATE \"C\" < $3"
        ));
    }

    #[test]
    fn test_document_equality_ignores_non_scalars() {
        let criteria = EntrySearchCriteria::new(
            SearchCriteria::new().with_custom_filter("tags", Condition::eq(r#"["a", "b"]"#)),
        );
        let sql = entry_count_query(&criteria).into_sql();
        assert!(sql.contains("IN ('string', 'number', 'boolean') THEN e.data ->> $2 END) = $3"));
    }

    #[test]
    fn test_exists_filter() {
        let criteria = EntrySearchCriteria::new(
            SearchCriteria::new()
                .with_custom_filter("color", Condition::new(FilterOp::Exists, "false")),
        );
        let sql = entry_count_query(&criteria).into_sql();
        assert!(sql.contains("(e.data ->> $1) IS NULL"));
    }

    #[test]
    fn test_default_order_has_id_tiebreak() {
        let sql = model_page_query(&SearchCriteria::new(), Pagination::new(1, 20)).into_sql();
        assert!(sql.contains("ORDER BY m.created_at DESC, m.id ASC LIMIT"));

        let sorted = SearchCriteria::new().sort_by(vec![SortKey::asc("name")]);
        let sql = model_page_query(&sorted, Pagination::new(1, 20)).into_sql();
        assert!(sql.contains("ORDER BY m.name COLLATE \"C\" ASC, m.id ASC LIMIT"));
    }

    #[test]
    fn test_like_patterns_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
