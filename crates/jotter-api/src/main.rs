use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use jotter_api::config::StorageSettings;
use jotter_api::telemetry::{self, LogSettings};
use jotter_api::{build_router, AppState, NoteService, RouterOptions, ServerConfig, TokenVerifier};
use jotter_db::{log_pool_metrics, Database, PoolConfig};
use jotter_storage::{FilesystemObjectStore, ObjectStore, S3ObjectStore};

/// Build the configured object store. Any failure here aborts startup.
async fn build_object_store(settings: &StorageSettings) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match settings {
        StorageSettings::S3(s3) => {
            let store = S3ObjectStore::new(s3.clone()).context("S3 storage initialization failed")?;
            Ok(Arc::new(store))
        }
        StorageSettings::Filesystem {
            path,
            public_base_url,
        } => {
            let store = FilesystemObjectStore::new(path, public_base_url);
            store
                .validate()
                .await
                .with_context(|| format!("file storage at {} is not usable", path.display()))?;
            info!(path = %path.display(), "File storage validated");
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _log_guard = telemetry::init(&LogSettings::from_env());

    let config = ServerConfig::from_env().context("invalid configuration")?;
    info!(
        storage_backend = config.storage.backend_name(),
        max_upload_bytes = config.max_upload_bytes,
        "Configuration loaded"
    );

    let db = Database::connect_with_config(
        &config.database_url,
        PoolConfig::new().max_connections(config.database_max_connections),
    )
    .await
    .context("database connection failed")?;
    db.migrate().await.context("database migration failed")?;
    log_pool_metrics(db.pool());
    info!("Database ready");

    let storage = build_object_store(&config.storage).await?;

    let http = reqwest::Client::new();
    let verifier = TokenVerifier::from_settings(&config.auth, &http)
        .await
        .context("authentication setup failed")?;

    let notes = NoteService::new(Arc::new(db.notes.clone()), storage);
    let state = AppState::new(notes, verifier);
    let app = build_router(state, &RouterOptions::from_config(&config));

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
