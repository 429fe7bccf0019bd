use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::actor::Actor;
use crate::error::{EngineError, ValidationErrors};
use crate::logic::validate::Payload;
use crate::logic::{EntryService, ModelService, QueryParser};
use crate::model::{
    Entry, EntrySearchCriteria, Id, Model, Projection, QuerySpec, SchemaSnapshot, SearchCriteria,
    UpdateOutcome,
};
use crate::store::Store;

/// Services shared by every handler
pub struct AppState<S> {
    pub models: ModelService<S>,
    pub entries: EntryService<S>,
    pub parser: QueryParser,
}

impl<S: Store> AppState<S> {
    pub fn new(store: Arc<S>, parser: QueryParser) -> Self {
        Self {
            models: ModelService::new(Arc::clone(&store)),
            entries: EntryService::new(store),
            parser,
        }
    }
}

pub type SharedState<S> = Arc<AppState<S>>;

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Per-key validation messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<BTreeMap<String, String>>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
            messages: None,
        }
    }

    pub fn validation(errors: &ValidationErrors) -> Self {
        Self {
            error: "Validation failed".to_string(),
            messages: Some(errors.messages().clone()),
        }
    }
}

/// Map a core error onto a status code. Storage detail is logged, never returned.
pub fn error_response(error: EngineError) -> (StatusCode, Json<ErrorResponse>) {
    match error {
        EngineError::Validation(errors) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::validation(&errors)),
        ),
        EngineError::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(&error.to_string())),
        ),
        EngineError::Conflict(message) => (StatusCode::CONFLICT, Json(ErrorResponse::new(&message))),
        EngineError::Storage(source) => {
            log::error!("Storage failure: {:#}", source);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal server error")),
            )
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub code: u16,
    pub timestamp: String,
}

impl Meta {
    fn new(status: StatusCode) -> Self {
        Self {
            code: status.as_u16(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PageInfo {
    pub current_page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

/// Envelope of index responses
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub meta: Meta,
    pub data: Vec<T>,
    pub pagination: PageInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl<T> ListResponse<T> {
    fn new(spec: &QuerySpec, data: Vec<T>, total_items: u64) -> Self {
        let page = spec.pagination();
        Self {
            meta: Meta::new(StatusCode::OK),
            data,
            pagination: PageInfo {
                current_page: page.page,
                per_page: page.limit,
                total_items,
                total_pages: page.total_pages(total_items),
            },
            request_id: spec.request_id.clone(),
        }
    }
}

/// Envelope of single-record responses
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub meta: Meta,
    pub data: T,
}

impl<T> DataResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            meta: Meta::new(StatusCode::OK),
            data,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedRecord {
    pub id: Id,
}

#[derive(Debug, Serialize)]
pub struct UpdatedRecord {
    pub id: Id,
    pub outcome: UpdateOutcome,
}

#[derive(Debug, Serialize)]
pub struct DeletedRecords {
    pub id: Id,
    pub deleted: u64,
}

fn created(id: Id) -> (StatusCode, Json<DataResponse<CreatedRecord>>) {
    (
        StatusCode::CREATED,
        Json(DataResponse {
            meta: Meta::new(StatusCode::CREATED),
            data: CreatedRecord { id },
        }),
    )
}

fn parse_query<S>(state: &AppState<S>, pairs: &[(String, String)]) -> ApiResult<QuerySpec> {
    state
        .parser
        .parse(pairs)
        .map_err(|errors| error_response(errors.into()))
}

// Models

pub async fn list_models<S: Store>(
    State(state): State<SharedState<S>>,
    Actor(_actor): Actor,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Json<ListResponse<Projection<Model>>>> {
    let spec = parse_query(&state, &pairs)?;
    let criteria = SearchCriteria::from_query(&spec).map_err(|e| error_response(e.into()))?;

    let total = state.models.count(&criteria).await.map_err(error_response)?;
    let models = state
        .models
        .paginate(spec.page, spec.limit, &criteria)
        .await
        .map_err(error_response)?;

    Ok(Json(ListResponse::new(&spec, models, total)))
}

pub async fn get_model<S: Store>(
    State(state): State<SharedState<S>>,
    Actor(_actor): Actor,
    Path(id): Path<Id>,
) -> ApiResult<Json<DataResponse<Model>>> {
    let model = state.models.find(id).await.map_err(error_response)?;
    Ok(DataResponse::ok(model))
}

pub async fn create_model<S: Store>(
    State(state): State<SharedState<S>>,
    Actor(actor): Actor,
    RequestJson(payload): RequestJson<Payload>,
) -> ApiResult<(StatusCode, Json<DataResponse<CreatedRecord>>)> {
    let id = state
        .models
        .create(&payload, actor)
        .await
        .map_err(error_response)?;
    Ok(created(id))
}

pub async fn update_model<S: Store>(
    State(state): State<SharedState<S>>,
    Actor(actor): Actor,
    Path(id): Path<Id>,
    RequestJson(payload): RequestJson<Payload>,
) -> ApiResult<Json<DataResponse<UpdatedRecord>>> {
    let outcome = state
        .models
        .update(id, &payload, actor)
        .await
        .map_err(error_response)?;
    Ok(DataResponse::ok(UpdatedRecord { id, outcome }))
}

/// Unknown or already deleted models answer 404 here even though the
/// underlying soft delete is idempotent
pub async fn delete_model<S: Store>(
    State(state): State<SharedState<S>>,
    Actor(actor): Actor,
    Path(id): Path<Id>,
) -> ApiResult<Json<DataResponse<DeletedRecords>>> {
    state.models.find(id).await.map_err(error_response)?;
    let deleted = state
        .models
        .delete_models(&[id], actor)
        .await
        .map_err(error_response)?;
    Ok(DataResponse::ok(DeletedRecords { id, deleted }))
}

pub async fn list_model_schemas<S: Store>(
    State(state): State<SharedState<S>>,
    Actor(_actor): Actor,
    Path(id): Path<Id>,
) -> ApiResult<Json<DataResponse<Vec<SchemaSnapshot>>>> {
    let history = state.models.history(id).await.map_err(error_response)?;
    Ok(DataResponse::ok(history))
}

// Entries

pub async fn list_entries<S: Store>(
    State(state): State<SharedState<S>>,
    Actor(_actor): Actor,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Json<ListResponse<Projection<Entry>>>> {
    let spec = parse_query(&state, &pairs)?;
    let criteria = EntrySearchCriteria::from_query(&spec).map_err(|e| error_response(e.into()))?;

    let total = state.entries.count(&criteria).await.map_err(error_response)?;
    let entries = state
        .entries
        .paginate(spec.page, spec.limit, &criteria)
        .await
        .map_err(error_response)?;

    Ok(Json(ListResponse::new(&spec, entries, total)))
}

pub async fn get_entry<S: Store>(
    State(state): State<SharedState<S>>,
    Actor(_actor): Actor,
    Path(id): Path<Id>,
) -> ApiResult<Json<DataResponse<Entry>>> {
    let entry = state.entries.find(id).await.map_err(error_response)?;
    Ok(DataResponse::ok(entry))
}

pub async fn create_entry<S: Store>(
    State(state): State<SharedState<S>>,
    Actor(actor): Actor,
    RequestJson(payload): RequestJson<Payload>,
) -> ApiResult<(StatusCode, Json<DataResponse<CreatedRecord>>)> {
    let id = state
        .entries
        .create(&payload, actor)
        .await
        .map_err(error_response)?;
    Ok(created(id))
}

pub async fn update_entry<S: Store>(
    State(state): State<SharedState<S>>,
    Actor(actor): Actor,
    Path(id): Path<Id>,
    RequestJson(payload): RequestJson<Payload>,
) -> ApiResult<Json<DataResponse<UpdatedRecord>>> {
    let outcome = state
        .entries
        .update(id, &payload, actor)
        .await
        .map_err(error_response)?;
    Ok(DataResponse::ok(UpdatedRecord { id, outcome }))
}

pub async fn delete_entry<S: Store>(
    State(state): State<SharedState<S>>,
    Actor(actor): Actor,
    Path(id): Path<Id>,
) -> ApiResult<Json<DataResponse<DeletedRecords>>> {
    let deleted = state
        .entries
        .delete_entries(&[id], actor)
        .await
        .map_err(error_response)?;
    Ok(DataResponse::ok(DeletedRecords { id, deleted }))
}
