//! quota-rs: download quota API server
//!
//! Serves the server-side quota counters and donor flags over HTTP.

use quota_rs::api::ApiServer;
use quota_rs::quota::{open_pool, SqliteDonorDirectory, SqliteQuotaStore};
use quota_rs::{logging, Config};
use std::path::Path;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref().map(Path::new))?;

    // Initialize logging
    logging::init(&config.logging)?;

    info!("Starting quota-rs v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path),
        None => info!("No config file specified, using defaults"),
    }
    info!("  Listening on: {}", config.server.listen_addr);
    info!("  Database: {}", config.storage.database_url);

    // Initialize storage
    let pool = open_pool(&config.storage.database_url).await?;
    let store = SqliteQuotaStore::new(pool.clone());
    store.init_db().await?;
    let donors = SqliteDonorDirectory::new(pool);
    donors.init_db().await?;

    let server = ApiServer::new(store, donors, config.server.listen_addr.clone());
    server.run().await?;

    Ok(())
}
