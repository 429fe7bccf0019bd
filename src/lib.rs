pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{EngineError, EntityKind, Result, ValidationErrors};

pub use logic::{
    ChunkFailure, EntryService, LifecycleManager, ModelService, ParseMode, QueryParser,
    SweepReport,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{EntryStore, MemoryStore, ModelStore, PostgresStore, Store};

use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::api::AppState;
use crate::config::AppConfig;

/// Router for `store` with CORS applied
pub fn build_app<S: Store + 'static>(store: Arc<S>, parser: QueryParser) -> Router {
    let state = Arc::new(AppState::new(store, parser));
    api::create_router::<S>()
        .with_state(state)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
}

/// Serve `app` on an already bound listener until the process stops
pub async fn serve(listener: TcpListener, app: Router) -> anyhow::Result<()> {
    axum::serve(listener, app).await?;
    Ok(())
}

/// Seed when `LOAD_SEED_DATA=true`, then bind and serve
pub async fn serve_store<S: Store + 'static>(store: Arc<S>, config: &AppConfig) -> anyhow::Result<()> {
    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        seed::load_seed_data(Arc::clone(&store)).await?;
    }

    let app = build_app(store, config.query_parser());
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Listening on http://{}", bind_address);

    serve(listener, app).await
}
