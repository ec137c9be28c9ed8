//! HTTP server bootstrap for the seal service.
//!
//! This module wires together:
//! - configuration
//! - database connection pool
//! - master key and key custody
//! - the seal service and its optional expiry sweeper
//! - the Axum router

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower_http::cors::AllowOrigin;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::infra::{
    shutdown_signal, spawn_until_shutdown, AppEnvironment, KeyCustody, MasterKey, PgAuditLogger,
    PgSealRepository, PgShipmentDirectory, ShutdownCoordinator,
};
use crate::service::{ExpirySweeper, SealService};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// Maximum database connections.
    pub max_connections: u32,
    /// Apply embedded migrations before serving.
    pub migrate_on_startup: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/agri_seal".to_string());

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("Invalid listen address {host}:{port}"))?;

        let max_connections: u32 = std::env::var("MAX_DB_CONNECTIONS")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(10);

        let migrate_on_startup = std::env::var("DB_MIGRATE_ON_STARTUP")
            .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
            .unwrap_or(true);

        Ok(Self {
            database_url,
            listen_addr,
            max_connections,
            migrate_on_startup,
        })
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SealService>,
    /// Checked by `/ready`; absent when the service runs on in-memory storage.
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(service: Arc<SealService>, pool: Option<PgPool>) -> Self {
        Self { service, pool }
    }
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting agri-seal v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let environment = AppEnvironment::from_env()?;
    let master_key = MasterKey::from_env(environment)?;

    info!(
        max_connections = config.max_connections,
        ?environment,
        "Connecting to database"
    );
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    if config.migrate_on_startup {
        info!("Running database migrations");
        crate::migrations::run_postgres(&pool).await?;
    } else {
        warn!("DB_MIGRATE_ON_STARTUP disabled; assuming schema is current");
    }

    let service = Arc::new(SealService::new(
        Arc::new(PgSealRepository::new(pool.clone())),
        Arc::new(PgShipmentDirectory::new(pool.clone())),
        Arc::new(PgAuditLogger::new(pool.clone())),
        KeyCustody::new(master_key),
    ));

    let shutdown = ShutdownCoordinator::new();
    let sweeper = match ExpirySweeper::interval_from_env() {
        Some(interval) => {
            info!(interval_secs = interval.as_secs(), "Expiry sweeper enabled");
            let sweeper = ExpirySweeper::new(service.clone(), interval);
            Some(spawn_until_shutdown(shutdown.signal(), sweeper.run()))
        }
        None => None,
    };

    let state = AppState::new(service, Some(pool.clone()));
    let app = build_router()?.with_state(state);

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("agri-seal is ready to accept connections");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.shutdown();
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            warn!(error = %e, "Expiry sweeper did not stop cleanly");
        }
    }
    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}

/// Install the global subscriber. `LOG_JSON=1` switches to JSON lines.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    let json = std::env::var("LOG_JSON")
        .map(|v| matches!(v.trim(), "1" | "true"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Router with `/api`, `/health` and `/ready`; call `.with_state` to finish it.
pub fn build_router() -> anyhow::Result<Router<AppState>> {
    let mut router = Router::new()
        .nest("/api", crate::api::router())
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TraceLayer::new_for_http());

    if let Some(cors_layer) = cors_layer_from_env()? {
        router = router.layer(cors_layer);
    }

    Ok(router)
}

fn cors_layer_from_env() -> anyhow::Result<Option<CorsLayer>> {
    let origins = match std::env::var("CORS_ALLOW_ORIGINS") {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    let origins = origins.trim();
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ]),
    ))
}

/// Health check endpoint.
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "agri-seal",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check endpoint.
async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let Some(pool) = state.pool.as_ref() else {
        return Ok(Json(serde_json::json!({
            "status": "ready",
            "database": "not configured",
        })));
    };

    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => Ok(Json(serde_json::json!({
            "status": "ready",
            "database": "connected",
        }))),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Database unavailable: {}", e),
        )),
    }
}
