// HBNB Store - Web Server
// REST API with Axum over the configured storage backend

use anyhow::{Context, Result};
use hbnb_store::api::{self, AppState};
use hbnb_store::{logging, Config, Registry};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();

    let config = Config::load().context("loading configuration")?;
    let registry = Arc::new(Registry::initialize(&config).context("opening storage")?);
    tracing::info!(
        storage = ?config.storage,
        search = ?config.search_mode(),
        "registry ready"
    );

    let app = api::router(AppState::new(registry.clone(), config.search_mode()));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("🚀 Server running on http://{}/api/v1", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    registry.shutdown()?;
    tracing::info!("storage closed");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for ctrl-c");
    }
}
