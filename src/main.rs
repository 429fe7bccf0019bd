use stardust_rust::config::{AppConfig, StorageBackend};
use stardust_rust::store::{MemoryStore, PostgresStore};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .init();

    println!("Stardust: Content Engine Server");

    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{} backend={:?}",
        config.server.host, config.server.port, config.database.backend
    );
    println!("Serving on http://{}", config.server_address());

    match config.database.backend {
        StorageBackend::Memory => {
            println!("Using in-memory store; data is lost on exit");
            stardust_rust::serve_store(Arc::new(MemoryStore::new()), &config).await?;
        }
        StorageBackend::Postgres => {
            println!("Connecting to PostgreSQL...");
            let database_url = config.database_url()?;
            let store =
                PostgresStore::new(&database_url, config.database.max_connections).await?;
            println!("Database ready");
            stardust_rust::serve_store(Arc::new(store), &config).await?;
        }
    }

    Ok(())
}
