//! `knobs` server entry point.
//!
//! Opens the storage backend, builds the settings blocks from the schema,
//! loads their stored values, then starts the Axum HTTP server with graceful
//! shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use knobs_core::auth::{AuthGate, SessionGate};
use knobs_storage::{MemoryBackend, StorageBackend};

use knobs_server::config::{ServerConfig, StorageBackendType};
use knobs_server::routes;
use knobs_server::schema::Schema;
use knobs_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment.
    let config = ServerConfig::from_env();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(storage = ?config.storage_backend, "knobs starting");

    let state = build_app_state(&config).await?;
    let app = routes::app(state);

    // Bind and serve.
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "knobs server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("knobs server stopped");
    Ok(())
}

fn open_storage(config: &ServerConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    let storage: Arc<dyn StorageBackend> = match &config.storage_backend {
        StorageBackendType::Memory => {
            info!("using in-memory storage (settings will not persist)");
            Arc::new(MemoryBackend::new())
        }
        #[cfg(feature = "redb-backend")]
        StorageBackendType::Redb { path } => {
            info!(path = %path, "using redb storage");
            Arc::new(knobs_storage::RedbBackend::open(path).context("failed to open redb storage")?)
        }
        #[cfg(not(feature = "redb-backend"))]
        StorageBackendType::Redb { .. } => {
            anyhow::bail!("redb backend requested but feature 'redb-backend' is not enabled");
        }
        #[cfg(feature = "rocksdb-backend")]
        StorageBackendType::RocksDb { path } => {
            info!(path = %path, "using RocksDB storage");
            Arc::new(
                knobs_storage::RocksDbBackend::open(path).context("failed to open RocksDB storage")?,
            )
        }
        #[cfg(not(feature = "rocksdb-backend"))]
        StorageBackendType::RocksDb { .. } => {
            anyhow::bail!("RocksDB backend requested but feature 'rocksdb-backend' is not enabled");
        }
    };
    Ok(storage)
}

/// Open storage, build every block from the schema, and load stored values.
async fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let storage = open_storage(config)?;

    let schema = match &config.schema_path {
        Some(path) => {
            info!(path = %path, "loading block schema");
            Schema::load(path).context("failed to load block schema")?
        }
        None => {
            info!("no KNOBS_SCHEMA set, serving the built-in demo blocks");
            Schema::builtin().context("built-in schema is invalid")?
        }
    };

    let gate = Arc::new(SessionGate::new(config.gate_config()));
    if !gate.is_active() && config.settings_password.is_none() {
        warn!("login disabled and KNOBS_SETTINGS_PASSWORD unset, settings are read-only");
    }

    let gate_dyn: Arc<dyn AuthGate> = Arc::clone(&gate) as Arc<dyn AuthGate>;
    let blocks = schema
        .build_blocks(&storage, &gate_dyn, config.settings_password.as_deref())
        .context("failed to build settings blocks")?;

    let mut loaded = Vec::with_capacity(blocks.len());
    for block in blocks {
        block.load().await;
        info!(namespace = %block.namespace(), path = %block.path(), "settings block ready");
        loaded.push(Arc::new(block));
    }

    Ok(Arc::new(AppState {
        blocks: loaded,
        gate,
        name: "knobs".to_owned(),
    }))
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
