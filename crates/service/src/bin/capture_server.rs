//! Capture service HTTP server.

use service::{handler, AppState, ServiceConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::from_env()?;
    let bind = config.bind;
    let state = AppState::new(config);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "capture service listening");
    axum::serve(listener, handler::router(state)).await?;
    Ok(())
}
