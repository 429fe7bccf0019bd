use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};

use crate::api::handlers::ErrorResponse;
use crate::model::ActorId;

pub const ACTOR_HEADER: &str = "x-user-id";

/// The authenticated user behind a request, read from `X-User-Id`.
/// Authentication itself happens upstream; a missing header is 401 and a
/// non-numeric one is 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub ActorId);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)
    }
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, (StatusCode, Json<ErrorResponse>)> {
    let Some(raw) = extract_header_value(headers, ACTOR_HEADER) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Missing X-User-Id header")),
        ));
    };

    raw.trim().parse::<ActorId>().map(Actor).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("X-User-Id must be a numeric user id")),
        )
    })
}

fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string())
}
