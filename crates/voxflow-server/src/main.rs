//! voxflow server entry point

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voxflow_config::Settings;
use voxflow_core::Assistant;
use voxflow_server::{init_metrics, router, AppState, InMemoryAssistantStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1);
    let settings = Arc::new(Settings::load(config_path.as_deref())?);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.observability.log_level.clone())),
        )
        .init();

    if settings.observability.metrics_enabled {
        init_metrics().map_err(std::io::Error::other)?;
    }

    let assistants = Arc::new(InMemoryAssistantStore::new());
    if let Some(path) = &settings.assistants_path {
        let raw = std::fs::read_to_string(path)?;
        let loaded: Vec<Assistant> = serde_json::from_str(&raw)?;
        info!(count = loaded.len(), path, "assistants loaded");
        assistants.load_all(loaded);
    } else {
        warn!("no assistants_path configured, starting with an empty store");
    }

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let state = AppState::new(Arc::clone(&settings), assistants);
    let app = router(state);

    info!(%addr, "voxflow server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
