use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use depot_files::{FileStorage, StorageConfig};

mod rest;

/// Main entry point for the Depot REST server
///
/// Resolves storage configuration once, starts the replication pool, and serves the file
/// endpoints until Ctrl-C. Queued replica copies are allowed to finish before exit.
///
/// # Environment Variables
/// - `DEPOT_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `DEPOT_STORAGE_DIRS`: comma-separated storage roots, primary first
/// - `DEPOT_WORK_DIR`: work directory used when no roots are configured (default: "work")
/// - `DEPOT_IMMUTABLE`: reject writes over existing files (default: false)
/// - `DEPOT_REPLICATION_WORKERS` / `DEPOT_REPLICATION_QUEUE`: replication pool sizing
/// - `DEPOT_READ_FALLBACK`: `strict` or `next-root`
/// - `DEPOT_STORAGE_NAME`: logical storage name (default: "fs")
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the storage configuration is invalid or the storage cannot be started,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("depot_run=info".parse()?)
                .add_directive("depot_files=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("DEPOT_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let config = StorageConfig::from_lookup(|key| std::env::var(key).ok())?;
    let storage = Arc::new(FileStorage::new(&config)?);

    if storage.roots().is_empty() {
        tracing::warn!("no storage roots configured; uploads will be rejected");
    }

    tracing::info!("++ Starting Depot REST on {}", addr);

    let app = rest::router(rest::AppState::new(Arc::clone(&storage)));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    match Arc::try_unwrap(storage) {
        Ok(storage) => tokio::task::spawn_blocking(move || storage.shutdown()).await?,
        Err(_) => tracing::warn!("storage still in use at exit; replication stops when it drops"),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("-- Shutting down Depot REST");
}
