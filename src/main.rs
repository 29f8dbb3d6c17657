use anyhow::{Context, Result};
use capture_session::{create_router, logging, AppState, Config};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("capture_session=info,tower_http=info");

    let cfg = Config::load("config/capture-session")?;

    info!("Capture Session v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!(
        "Recording defaults: {}x{} @ {} fps, backend {:?}",
        cfg.recording.width, cfg.recording.height, cfg.recording.fps, cfg.recording.backend
    );

    let address = cfg.service.http.address();
    let app = create_router(AppState::new(cfg.recording));

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("HTTP server listening on {}", address);

    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
