use anyhow::{Context, Result};
use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use sqlx::SqlitePool;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::models::{ApiError, HealthResponse};
use crate::config::ServerConfig;
use crate::db::{create_pool, run_migrations};

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
}

/// HTTP service instance
pub struct ApiServer {
    config: ServerConfig,
}

impl ApiServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Connect, migrate, and serve until Ctrl-C
    pub async fn run(self) -> Result<()> {
        let db_pool = create_pool(&self.config.database_url, self.config.max_connections)
            .await
            .context("Failed to connect to database")?;
        run_migrations(&db_pool)
            .await
            .context("Failed to apply database migrations")?;

        let app = create_router(AppState { db_pool });

        let listener = tokio::net::TcpListener::bind(self.config.bind)
            .await
            .with_context(|| format!("Failed to bind to {}", self.config.bind))?;

        tracing::info!(
            bind = %self.config.bind,
            database = %self.config.redacted_database_url(),
            max_connections = self.config.max_connections,
            "Firmdesk server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;

        tracing::info!("Firmdesk server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    use super::routes;

    let api_routes = Router::new()
        .route("/health", get(health_handler))
        .merge(routes::api_routes());

    Router::new()
        .nest("/api", api_routes)
        .fallback(not_found_handler)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::PUT,
                    Method::DELETE,
                ])
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "firmdesk".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError {
            code: "NOT_FOUND".to_string(),
            message: "Resource not found".to_string(),
            details: None,
        }),
    )
}
