use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use lumina_interior::config::AppConfig;
use lumina_interior::gemini::GeminiClient;
use lumina_interior::github::GitHubClient;
use lumina_interior::routes::{router, AppState};
use lumina_interior::studio::Studio;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env()?;

    let gemini = GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_api_base.clone(),
        config.gemini_model.clone(),
        config.gemini_timeout,
    );
    if gemini.is_demo() {
        tracing::warn!("GEMINI_API_KEY not set; serving placeholder designs (demo mode)");
    } else {
        tracing::info!("Using Gemini model {}", config.gemini_model);
    }

    let studio = Arc::new(Studio::new(
        Arc::new(gemini),
        Arc::new(GitHubClient::new(config.github_api_base.clone())),
        config.styles.clone(),
        config.preprocess,
    ));
    let _sweeper = studio.spawn_idle_sweeper(config.session_idle_ttl, config.session_sweep_interval);
    let styles: Vec<&str> = studio.styles().iter().map(|s| s.name()).collect();
    tracing::info!("🎨 Styles: {}", styles.join(", "));

    let app = router(AppState { studio }, config.max_upload_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Starting server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
