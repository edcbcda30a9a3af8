use anyhow::{Context, Result};
use goal_insight_analysis::{router, AppState, BatchConfig, BatchRunner, Database, ServiceConfig};
use goal_insight_llm::ModelConfig;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Goal Insight Analysis Service v{}", env!("CARGO_PKG_VERSION"));

    let service = ServiceConfig::from_env();
    let batch = BatchConfig::from_env();
    let model_config = ModelConfig::from_env().context("Invalid AI_MODEL configuration")?;

    // Create directory if it doesn't exist
    if let Some(parent) = std::path::Path::new(&service.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db = Arc::new(Mutex::new(Database::new(&service.db_path)?));
    info!("Database initialized at: {}", service.db_path);

    let model = model_config.build()?;
    info!(
        "Using {} model {} (timeout {}s)",
        model.name(),
        model_config.model,
        model_config.timeout_secs
    );

    if service.cron_secret.is_none() {
        warn!("CRON_SECRET is not set; every trigger call will be rejected");
    }

    let runner = BatchRunner::new(Arc::new(db.clone()), model, batch);
    let state = AppState {
        db,
        runner: Arc::new(runner),
        cron_secret: service.cron_secret.clone(),
    };

    let app = router(state);

    info!("Starting HTTP server on {}", service.bind_addr);
    let listener = tokio::net::TcpListener::bind(&service.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
