use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use drinks_service::app::{build_jwt_verifier, connect_repository, cors_layer, spawn_jwks_refresh};
use drinks_service::repo::seed_if_empty;
use drinks_service::{build_router, AppState, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env()?;

    let jwt_verifier = build_jwt_verifier(&config.jwt).await?;
    spawn_jwks_refresh(jwt_verifier.clone(), config.jwks_refresh_secs);

    let repo = connect_repository(&config).await?;
    if config.seed_on_start {
        seed_if_empty(repo.as_ref()).await.context("failed to seed drink table")?;
    }

    let state = AppState::new(repo, jwt_verifier, config.compat);
    let app = build_router(state, cors_layer(&config.cors_allowed_origins));

    let addr = config.listen_addr()?;
    info!(%addr, compat = ?config.compat, "starting drinks-service");
    let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("drinks-service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
