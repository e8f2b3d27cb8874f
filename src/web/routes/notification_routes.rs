use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::error;

use crate::db::services::notification_log_service::{self, NotificationListItem};
use crate::db::services::{monitor_service, settings_service, user_service};
use crate::notifications::templates;
use crate::web::auth::require_admin;
use crate::web::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<NotificationListItem>>, AppError> {
    let limit = query.limit.filter(|n| *n > 0 && *n <= 200).unwrap_or(20);
    Ok(Json(
        notification_log_service::list_recent(&state.pool, limit).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct TestRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub monitor_id: i64,
}

/// POST /api/notifications/test — writes a test record and pushes a test
/// mail through the configured transport. Delivery errors surface to the
/// caller here, unlike the fire-and-forget gate path.
pub async fn test_notification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<TestRequest>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers)?;
    if payload.monitor_id <= 0
        || !matches!(payload.kind.as_str(), "online" | "offline" | "ssl_expiry")
    {
        return Err(AppError::InvalidInput("无效的测试请求".to_string()));
    }

    let monitor = monitor_service::get_monitor(&state.pool, payload.monitor_id)
        .await?
        .ok_or_else(|| AppError::NotFound("监控不存在".to_string()))?;
    let settings = settings_service::load_settings(&state.pool, &state.cfg).await?;

    let (record_kind, message) = match payload.kind.as_str() {
        "online" => (notification_log_service::KIND_STATUS_CHANGE, "服务恢复(测试)"),
        "offline" => (notification_log_service::KIND_STATUS_CHANGE, "服务离线(测试)"),
        _ => (notification_log_service::KIND_SSL_EXPIRY, "证书到期(测试)"),
    };
    notification_log_service::append(&state.pool, monitor.id, record_kind, message).await?;

    if !settings.enable_notifications {
        return Ok(StatusCode::NO_CONTENT);
    }
    if !crate::monitoring::gate::event_selected(&settings.notify_events, &payload.kind) {
        return Ok(StatusCode::NO_CONTENT);
    }

    let mut recipients = settings_service::split_csv(&settings.to_emails);
    if recipients.is_empty() {
        if let Some(admin) = user_service::default_recipient_email(&state.pool).await? {
            if !admin.trim().is_empty() {
                recipients.push(admin);
            }
        }
    }
    if recipients.is_empty() {
        return Ok(StatusCode::NO_CONTENT);
    }
    if !settings.smtp_configured() {
        return Err(AppError::InvalidInput("SMTP配置不完整".to_string()));
    }

    let subject = templates::subject_test(&payload.kind, &monitor.name, &settings.site_name);
    let html = state
        .templates
        .body_test(
            &settings.site_name,
            &monitor.name,
            &monitor.url,
            &payload.kind,
            &Utc::now().to_rfc3339(),
        )
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    for to in &recipients {
        if let Err(e) = state.mailer.send(&settings, to, &subject, &html).await {
            error!(to = %to, error = %e, "测试邮件发送失败");
            return Err(AppError::InternalServerError(format!(
                "SMTP发送失败: {e}"
            )));
        }
    }
    Ok(StatusCode::NO_CONTENT)
}
