use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use sqlx::PgPool;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::ids::IdGenerator;
use crate::monitoring::events::EventBus;
use crate::monitoring::MonitorEngine;
use crate::notifications::{Mailer, Templates};

pub mod auth;
pub mod routes;

/// Shared handler state.
pub struct AppState {
    pub pool: PgPool,
    pub cfg: Config,
    pub engine: Arc<MonitorEngine>,
    pub bus: Arc<EventBus>,
    pub templates: Arc<Templates>,
    pub mailer: Mailer,
    pub ids: IdGenerator,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "无效凭据".to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {msg}"),
            ),
            AppError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({ "error": error_message }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/api/login", post(auth::login_handler))
        .route("/api/admin/verify", get(auth::verify_handler))
        .route(
            "/api/monitors",
            get(routes::monitor_routes::list_monitors).post(routes::monitor_routes::create_monitor),
        )
        .route(
            "/api/monitors/{id}",
            get(routes::monitor_routes::get_monitor)
                .put(routes::monitor_routes::update_monitor)
                .delete(routes::monitor_routes::delete_monitor),
        )
        .route("/api/monitors/{id}/run", post(routes::monitor_routes::run_now))
        .route("/api/monitors/{id}/latest", get(routes::monitor_routes::latest_result))
        .route("/api/monitors/{id}/history", get(routes::monitor_routes::history))
        .route(
            "/api/monitors/{id}/subscriptions",
            delete(routes::monitor_routes::delete_monitor_subscriptions),
        )
        .route("/api/ssl/{id}", get(routes::monitor_routes::ssl_info))
        .route(
            "/api/groups",
            get(routes::group_routes::list_groups).post(routes::group_routes::create_group),
        )
        .route(
            "/api/groups/{id}",
            axum::routing::put(routes::group_routes::update_group)
                .delete(routes::group_routes::delete_group),
        )
        .route(
            "/api/notifications",
            get(routes::notification_routes::list_notifications),
        )
        .route(
            "/api/notifications/test",
            post(routes::notification_routes::test_notification),
        )
        .route(
            "/api/public/subscribe",
            post(routes::subscription_routes::public_subscribe),
        )
        .route(
            "/api/subscriptions/verify",
            get(routes::subscription_routes::verify_subscription),
        )
        .route(
            "/api/subscriptions",
            get(routes::subscription_routes::list_subscriptions)
                .post(routes::subscription_routes::create_subscription),
        )
        .route(
            "/api/subscriptions/{id}",
            delete(routes::subscription_routes::delete_subscription),
        )
        .route("/api/events", get(routes::event_routes::sse_events))
        .route("/api/setup/state", get(routes::setup_routes::setup_state))
        .route("/api/setup", post(routes::setup_routes::setup))
        .route("/api/health", get(routes::setup_routes::health))
        .route(
            "/api/settings",
            get(routes::settings_routes::get_settings).put(routes::settings_routes::update_settings),
        )
        .layer(middleware::from_fn(log_requests))
        .layer(cors)
        .with_state(state)
}

pub async fn run_http_server(
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = state.cfg.bind_addr();
    let router = build_router(state);
    info!(addr = %addr, "后端启动");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

/// Structured request log, skipping the long-lived SSE connection.
async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    if path == "/api/events" {
        return next.run(req).await;
    }
    let start = Instant::now();
    let response = next.run(req).await;
    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "HTTP请求"
    );
    response
}
