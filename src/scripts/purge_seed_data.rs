use anyhow::{Context, Result};
use std::sync::Arc;
use stardust_rust::config::AppConfig;
use stardust_rust::logic::LifecycleManager;
use stardust_rust::seed::SEEDER_ACTOR_ID;
use stardust_rust::store::PostgresStore;

/// Soft delete and purge every model created by the seeder, in chunks.
/// Chunk failures are reported and the sweep carries on.
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let database_url = config.database_url()?;

    println!("Connecting to database...");
    let store = PostgresStore::new(&database_url, config.database.max_connections)
        .await
        .context("Failed to connect to database")?;

    let manager = LifecycleManager::new(Arc::new(store))
        .with_chunk_size(config.engine.purge_chunk_size);

    println!(
        "Purging models created by seeder {} in chunks of {}",
        SEEDER_ACTOR_ID,
        manager.chunk_size()
    );
    let report = manager
        .purge_models_by_creator(SEEDER_ACTOR_ID, SEEDER_ACTOR_ID)
        .await
        .context("Failed to list seeded models")?;

    for failure in &report.failures {
        println!(
            "Chunk {} failed ({} ids): {}",
            failure.chunk,
            failure.ids.len(),
            failure.error
        );
    }

    println!(
        "Purged {} models in {} chunks ({} failed)",
        report.purged,
        report.chunks,
        report.failures.len()
    );

    Ok(())
}
