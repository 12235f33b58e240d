//! Hireflow Service - HTTP API for credits and CV unlocks.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hireflow_service::{create_router, AppState, ServiceConfig};
use hireflow_store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hireflow=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Hireflow Service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        postgres = config.database_url.is_some(),
        data_dir = ?config.data_dir,
        paddle_configured = config.paddle_webhook_secret.is_some(),
        ledger_max_append_attempts = config.ledger_max_append_attempts,
        "Service configuration loaded"
    );

    let store = open_store(&config).await?;
    let app = create_router(AppState::new(store, config.clone()));
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// PostgreSQL when `DATABASE_URL` is set, then `RocksDB` when built with it and
/// `DATA_DIR` is set, otherwise an in-memory store.
async fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    if let Some(url) = &config.database_url {
        tracing::info!("Connecting to PostgreSQL");
        let store = PgStore::connect(url, config.database_max_connections).await?;
        return Ok(Arc::new(store));
    }

    #[cfg(feature = "rocksdb-backend")]
    if let Some(dir) = &config.data_dir {
        tracing::info!(path = %dir, "Opening RocksDB store");
        return Ok(Arc::new(hireflow_store::RocksStore::open(dir)?));
    }

    tracing::warn!("No durable backend configured - using in-memory store");
    Ok(Arc::new(MemoryStore::new()))
}
