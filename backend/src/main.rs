//! Inventory Ledger - Backend Server
//!
//! Stock accounting for received parts: inspection, production use, sales
//! and invoice / delivery chalan allocation, tracked lot by lot.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use inventory_ledger::{
    config::{CatalogSource, Config, StoreBackend},
    create_app,
    external::{CsvPartCatalog, HttpPartCatalog, NoCatalog, PartCatalog},
    store::{LedgerStore, MemoryLedgerStore, PgLedgerStore},
    AppState,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "inventory_ledger=debug,inventory_ledger_server=debug,tower_http=debug,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Inventory Ledger Server");
    tracing::info!("Environment: {}", config.environment);

    let catalog = build_catalog(&config)?;

    match config.store.backend {
        StoreBackend::Postgres => {
            // Create database connection pool
            tracing::info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(&config.database.url)
                .await?;

            tracing::info!("Database connection established");

            // Run migrations in development
            if config.environment == "development" {
                tracing::info!("Running database migrations...");
                sqlx::migrate!("./migrations").run(&db_pool).await?;
                tracing::info!("Migrations completed");
            }

            serve(PgLedgerStore::new(db_pool), catalog, config).await
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; nothing survives a restart");
            serve(MemoryLedgerStore::new(), catalog, config).await
        }
    }
}

/// Pick the part catalog named in the configuration
fn build_catalog(config: &Config) -> anyhow::Result<Arc<dyn PartCatalog>> {
    let catalog: Arc<dyn PartCatalog> = match config.catalog.source {
        CatalogSource::None => Arc::new(NoCatalog),
        CatalogSource::Csv => {
            let path = config
                .catalog
                .csv_path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("catalog.csv_path is required for a CSV catalog"))?;
            tracing::info!("Part catalog: CSV file {}", path);
            Arc::new(CsvPartCatalog::new(path))
        }
        CatalogSource::Http => {
            let endpoint = config
                .catalog
                .endpoint
                .clone()
                .ok_or_else(|| anyhow::anyhow!("catalog.endpoint is required for an HTTP catalog"))?;
            tracing::info!("Part catalog: {}", endpoint);
            Arc::new(HttpPartCatalog::new(endpoint, config.catalog.api_key.clone())?)
        }
    };
    Ok(catalog)
}

async fn serve<S: LedgerStore>(
    store: S,
    catalog: Arc<dyn PartCatalog>,
    config: Config,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    // Build application
    let app = create_app(AppState::new(store, catalog, config));

    // Start server
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
