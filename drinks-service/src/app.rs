use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::handler::Handler;
use axum::http::{header::{AUTHORIZATION, CONTENT_TYPE}, HeaderValue, Method};
use axum::{middleware, routing::{get, patch}, Router};
use common_auth::{require_permission, AuthGuard, JwtConfig, JwtVerifier};
use common_http_errors::{normalize_error_response, ApiError};
use tokio::time::{interval, MissedTickBehavior};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::config::{Compatibility, JwtSettings, ServiceConfig};
use crate::drink_handlers::{create_drink, delete_drink, list_drinks, list_drinks_detail, update_drink};
use crate::metrics::{http_error_metrics, metrics_endpoint};
use crate::permissions::{DELETE_DRINKS, GET_DRINKS, GET_DRINKS_DETAIL, PATCH_DRINKS, POST_DRINKS};
use crate::repo::{DrinkRepository, InMemoryDrinkRepository, PgDrinkRepository};

/// Shared application state handed to the guards and handlers.
#[derive(Clone)]
pub struct AppState {
    repo: Arc<dyn DrinkRepository>,
    jwt_verifier: Arc<JwtVerifier>,
    compat: Compatibility,
}

impl AppState {
    pub fn new(repo: Arc<dyn DrinkRepository>, jwt_verifier: Arc<JwtVerifier>, compat: Compatibility) -> Self {
        Self { repo, jwt_verifier, compat }
    }

    pub fn repo(&self) -> &dyn DrinkRepository {
        self.repo.as_ref()
    }

    pub fn jwt_verifier(&self) -> &Arc<JwtVerifier> {
        &self.jwt_verifier
    }

    pub fn compat(&self) -> Compatibility {
        self.compat
    }
}

/// Pins the optional dev PEM as `local-dev`, then loads the JWKS once so startup fails on a bad key source.
pub async fn build_jwt_verifier(settings: &JwtSettings) -> anyhow::Result<Arc<JwtVerifier>> {
    let config = JwtConfig::new(settings.issuer.clone(), settings.audience.clone())
        .with_leeway(settings.leeway_seconds);
    let mut verifier = JwtVerifier::new(config);
    if let Some(pem) = &settings.dev_public_key_pem {
        warn!("Using JWT_DEV_PUBLIC_KEY_PEM for verification; do not enable in production");
        verifier = verifier
            .with_local_key("local-dev", pem.as_bytes())
            .context("JWT_DEV_PUBLIC_KEY_PEM is not a valid RSA public key")?;
    }
    if let Some(url) = &settings.jwks_url {
        info!(jwks_url = %url, "Configuring JWKS fetcher");
        verifier = verifier.with_jwks_url(url.clone());
        verifier
            .refresh_jwks()
            .await
            .context("failed to load the initial JWKS key set")?;
    }
    info!(keys = verifier.keys().len(), "JWT verifier initialised");
    Ok(Arc::new(verifier))
}

pub fn spawn_jwks_refresh(verifier: Arc<JwtVerifier>, refresh_secs: u64) {
    let Some(url) = verifier.jwks_url().map(str::to_owned) else { return };
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(refresh_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately and startup already loaded the keys.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match verifier.refresh_jwks().await {
                Ok(count) => debug!(count, jwks_url = %url, "Refreshed JWKS keys"),
                Err(err) => warn!(error = %err, jwks_url = %url, "Failed to refresh JWKS keys; keeping previous set"),
            }
        }
    });
}

/// Postgres when `DATABASE_URL` is set (migrated before use), otherwise a process-local store.
pub async fn connect_repository(config: &ServiceConfig) -> anyhow::Result<Arc<dyn DrinkRepository>> {
    match &config.database_url {
        Some(url) => {
            let repo = PgDrinkRepository::connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            repo.migrate().await.context("failed to run drink migrations")?;
            info!("using Postgres drink repository");
            Ok(Arc::new(repo))
        }
        None => {
            warn!("DATABASE_URL not set; drinks are kept in memory and lost on restart");
            Ok(Arc::new(InMemoryDrinkRepository::new()))
        }
    }
}

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);
    if allowed_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    cors.allow_origin(AllowOrigin::list(
        allowed_origins
            .iter()
            .filter_map(|o| o.parse::<HeaderValue>().ok())
            .collect::<Vec<_>>(),
    ))
}

pub async fn health() -> &'static str {
    "ok"
}

async fn fallback() -> ApiError {
    ApiError::not_found("route_not_found")
}

pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    let verifier = state.jwt_verifier().clone();
    let guard = |required: &'static str| AuthGuard::new(verifier.clone(), required);

    let routes = Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route(
            "/drinks",
            get(list_drinks.layer(middleware::from_fn_with_state(guard(GET_DRINKS), require_permission)))
                .post(create_drink.layer(middleware::from_fn_with_state(guard(POST_DRINKS), require_permission))),
        )
        .route(
            "/drinks-detail",
            get(list_drinks_detail.layer(middleware::from_fn_with_state(guard(GET_DRINKS_DETAIL), require_permission))),
        )
        .route(
            "/drinks/:id",
            patch(update_drink.layer(middleware::from_fn_with_state(guard(PATCH_DRINKS), require_permission)))
                .delete(delete_drink.layer(middleware::from_fn_with_state(guard(DELETE_DRINKS), require_permission))),
        )
        .fallback(fallback)
        .with_state(state);
    with_service_layers(routes, cors)
}

/// Service-wide layers, innermost first. A panic surfaces as a bare 500 that the envelope
/// middleware then rewrites.
pub fn with_service_layers(routes: Router, cors: CorsLayer) -> Router {
    routes
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn(normalize_error_response))
        .layer(middleware::from_fn(http_error_metrics))
        .layer(cors)
}
