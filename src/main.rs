use anyhow::Result;
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod stores;

use services::project_service::ProjectService;
use stores::{
    ContentStore, MetadataStore,
    disk::DiskContentStore,
    memory::{MemoryContentStore, MemoryMetadataStore},
    sqlite::SqliteMetadataStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting project-store with config: {:?}", cfg);

    // --- Initialize stores ---
    let (content, metadata): (Arc<dyn ContentStore>, Arc<dyn MetadataStore>) = if cfg.in_memory {
        if migrate {
            tracing::info!("In-memory stores need no migration.");
            return Ok(());
        }
        tracing::warn!("Running with in-memory stores; projects will not survive a restart");
        (
            Arc::new(MemoryContentStore::new()) as Arc<dyn ContentStore>,
            Arc::new(MemoryMetadataStore::new()) as Arc<dyn MetadataStore>,
        )
    } else {
        // --- Ensure storage directory exists ---
        if !Path::new(&cfg.storage_dir).exists() {
            fs::create_dir_all(&cfg.storage_dir)?;
            tracing::info!("Created storage directory at {}", cfg.storage_dir);
        }

        let metadata = connect_metadata(&cfg).await?;
        metadata.migrate().await?;

        // --- Handle migration mode ---
        if migrate {
            tracing::info!("Database migration complete.");
            return Ok(()); // exit after migration
        }

        let content = DiskContentStore::new(&cfg.storage_dir, cfg.content_namespace.clone());
        tracing::info!("Storing project files under {}", content.root().display());
        (
            Arc::new(content) as Arc<dyn ContentStore>,
            Arc::new(metadata) as Arc<dyn MetadataStore>,
        )
    };

    // --- Initialize core service ---
    let service = ProjectService::new(content, metadata, cfg.limits);

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.limits).with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Open the SQLite metadata database, creating the file and its parent
/// directory when missing.
async fn connect_metadata(cfg: &config::AppConfig) -> Result<SqliteMetadataStore> {
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(SqliteMetadataStore::new(
        Arc::new(pool),
        cfg.metadata_namespace.clone(),
    ))
}
