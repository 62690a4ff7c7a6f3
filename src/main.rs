use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use mosaic_api::{
    api::{create_router, AppState},
    config::Config,
    services::ModelRegistry,
    store::{MemoryStore, PgStore, SharedStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    // Data provider is chosen exactly once, here: the real store when
    // Postgres is reachable, the in-memory fixture otherwise.
    let store: SharedStore = match PgStore::connect(&config.database_url).await {
        Ok(store) => {
            tracing::info!("Connected to Postgres store");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Postgres unavailable, using in-memory fixture store");
            Arc::new(MemoryStore::with_sample_data().await)
        }
    };

    let registry = Arc::new(ModelRegistry::open(&config.model_dir));
    let state = AppState::new(store, registry);
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
