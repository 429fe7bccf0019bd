use axum::{routing::get, Router};

use crate::api::handlers::{self, SharedState};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<SharedState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Models
        .route(
            "/api/v1/models",
            get(handlers::list_models::<S>).post(handlers::create_model::<S>),
        )
        .route(
            "/api/v1/models/:id",
            get(handlers::get_model::<S>)
                .put(handlers::update_model::<S>)
                .patch(handlers::update_model::<S>)
                .delete(handlers::delete_model::<S>),
        )
        .route(
            "/api/v1/models/:id/schemas",
            get(handlers::list_model_schemas::<S>),
        )
        // Entries
        .route(
            "/api/v1/entries",
            get(handlers::list_entries::<S>).post(handlers::create_entry::<S>),
        )
        .route(
            "/api/v1/entries/:id",
            get(handlers::get_entry::<S>)
                .put(handlers::update_entry::<S>)
                .patch(handlers::update_entry::<S>)
                .delete(handlers::delete_entry::<S>),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::AppState;
    use crate::logic::QueryParser;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = Arc::new(AppState::new(
            Arc::new(MemoryStore::new()),
            QueryParser::default(),
        ));
        create_router::<MemoryStore>().with_state(state)
    }

    #[tokio::test]
    async fn test_health_needs_no_actor() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_requires_actor_header() {
        let response = app()
            .oneshot(Request::get("/api/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_model_is_not_found() {
        let response = app()
            .oneshot(
                Request::delete("/api/v1/models/77")
                    .header("X-User-Id", "1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_entry_delete_is_ok() {
        let response = app()
            .oneshot(
                Request::delete("/api/v1/entries/77")
                    .header("X-User-Id", "1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
