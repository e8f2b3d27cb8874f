use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config;
use crate::db;
use crate::db::services::{settings_service, user_service};
use crate::web::{AppError, AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        name: "Monitor Backend",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

#[derive(Debug, Serialize)]
pub struct SetupState {
    pub installed: bool,
}

/// GET /api/setup/state — installed when a `.env` exists or an admin row
/// is already present.
pub async fn setup_state(State(state): State<Arc<AppState>>) -> Json<SetupState> {
    if Path::new(".env").exists() {
        return Json(SetupState { installed: true });
    }
    let installed = user_service::admin_count(&state.pool)
        .await
        .map(|c| c > 0)
        .unwrap_or(false);
    Json(SetupState { installed })
}

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub database_url: String,
    #[serde(default)]
    pub addr: String,
    pub admin_email: String,
    pub admin_password: String,
    #[serde(default)]
    pub resend_api_key: String,
    #[serde(default)]
    pub alert_before_days: i32,
    #[serde(default)]
    pub check_interval_seconds: i32,
}

/// POST /api/setup — first-time installation: validates the target database,
/// migrates it, creates the admin account and persists the `.env` file.
pub async fn setup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SetupRequest>,
) -> Result<StatusCode, AppError> {
    if payload.database_url.trim().is_empty()
        || payload.admin_email.trim().is_empty()
        || payload.admin_password.is_empty()
    {
        return Err(AppError::InvalidInput("缺少必填字段".to_string()));
    }

    let pool = db::connect(&payload.database_url).await.map_err(|e| {
        error!(error = %e, "安装时数据库连接失败");
        AppError::InvalidInput("数据库连接失败".to_string())
    })?;
    db::migrate(&pool).await.map_err(|e| {
        error!(error = %e, "安装时数据库迁移失败");
        AppError::InternalServerError("数据库迁移失败".to_string())
    })?;

    let password_hash = bcrypt::hash(&payload.admin_password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::InternalServerError(format!("密码加密失败: {e}")))?;
    user_service::upsert_admin(&pool, payload.admin_email.trim(), &password_hash).await?;

    let addr = if payload.addr.trim().is_empty() {
        ":8080".to_string()
    } else {
        payload.addr.clone()
    };
    let alert_before_days = if payload.alert_before_days == 0 {
        14
    } else {
        payload.alert_before_days
    };
    let check_interval_seconds = if payload.check_interval_seconds == 0 {
        60
    } else {
        payload.check_interval_seconds
    };
    settings_service::seed_settings(
        &pool,
        &addr,
        &payload.database_url,
        &payload.resend_api_key,
        alert_before_days,
        check_interval_seconds,
    )
    .await?;

    config::write_env_file(
        Path::new(".env"),
        &[
            ("ADDR", addr),
            ("DATABASE_URL", payload.database_url.clone()),
            ("RESEND_API_KEY", payload.resend_api_key.clone()),
            ("ALERT_BEFORE_DAYS", alert_before_days.to_string()),
            ("CHECK_INTERVAL_SECONDS", check_interval_seconds.to_string()),
        ],
    )
    .map_err(|e| AppError::InternalServerError(format!("写入配置文件失败: {e}")))?;

    if payload.database_url != state.cfg.database_url {
        // The running pool keeps pointing at the boot-time database; the
        // freshly configured one takes over on the next start.
        info!("安装指向了新的数据库，重启后生效");
    }
    info!(admin = %payload.admin_email, "安装完成");
    Ok(StatusCode::CREATED)
}
