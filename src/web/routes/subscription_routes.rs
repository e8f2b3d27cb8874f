use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Html;
use axum::Json;
use rand::RngCore;
use serde::Deserialize;
use tracing::warn;

use crate::db::services::subscription_service::{self, SubscriptionListItem, VerifyOutcome};
use crate::db::services::{monitor_service, settings_service};
use crate::notifications::templates;
use crate::web::auth::require_admin;
use crate::web::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub monitor_id: i64,
    pub email: String,
    pub notify_events: Vec<String>,
}

/// POST /api/public/subscribe — open endpoint behind the verified-email flow.
pub async fn public_subscribe(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SubscribeRequest>,
) -> Result<StatusCode, AppError> {
    if payload.monitor_id <= 0
        || payload.email.trim().is_empty()
        || payload.notify_events.is_empty()
    {
        return Err(AppError::InvalidInput("缺少必填字段".to_string()));
    }
    if !payload.email.contains('@') {
        return Err(AppError::InvalidInput("邮箱格式不正确".to_string()));
    }

    let monitor = monitor_service::get_monitor(&state.pool, payload.monitor_id)
        .await?
        .ok_or_else(|| AppError::NotFound("监控不存在".to_string()))?;
    let settings = settings_service::load_settings(&state.pool, &state.cfg).await?;
    if !settings.smtp_configured() {
        return Err(AppError::InvalidInput("SMTP未配置".to_string()));
    }

    let token = new_verify_token();
    let id = state.ids.next();
    subscription_service::create_unverified(
        &state.pool,
        id,
        payload.monitor_id,
        payload.email.trim(),
        &payload.notify_events.join(","),
        &token,
    )
    .await?;

    let verify_url = format!(
        "{}://{}/api/subscriptions/verify?token={}",
        forwarded_proto(&headers),
        request_host(&headers),
        token
    );
    let subject = templates::subject_subscribe_verify(&monitor.name, &settings.site_name);
    let html = state
        .templates
        .body_subscribe_verify(&settings.site_name, &monitor.name, &verify_url)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let mailer = state.mailer.clone();
    let to = payload.email.trim().to_string();
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&settings, &to, &subject, &html).await {
            warn!(to = %to, error = %e, "订阅验证邮件发送失败");
        }
    });

    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

/// GET /api/subscriptions/verify?token=… — one-shot verification link.
pub async fn verify_subscription(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Result<Html<String>, AppError> {
    let token = query
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::InvalidInput("缺少token".to_string()))?;

    match subscription_service::verify_by_token(&state.pool, token).await? {
        VerifyOutcome::Verified => {
            let settings = settings_service::load_settings(&state.pool, &state.cfg).await?;
            let page = state
                .templates
                .page_verify_success(&settings.site_name)
                .map_err(|e| AppError::InternalServerError(e.to_string()))?;
            Ok(Html(page))
        }
        VerifyOutcome::Expired => Err(AppError::InvalidInput("token已过期".to_string())),
        VerifyOutcome::NotFound => Err(AppError::InvalidInput("无效的token".to_string())),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub monitor_id: Option<i64>,
}

pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SubscriptionListItem>>, AppError> {
    require_admin(&state, &headers)?;
    if let Some(mid) = query.monitor_id {
        if mid <= 0 {
            return Err(AppError::InvalidInput("无效的monitor_id".to_string()));
        }
    }
    Ok(Json(
        subscription_service::list(&state.pool, query.monitor_id).await?,
    ))
}

pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SubscribeRequest>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers)?;
    if payload.monitor_id <= 0
        || payload.email.trim().is_empty()
        || payload.notify_events.is_empty()
    {
        return Err(AppError::InvalidInput("缺少必填字段".to_string()));
    }
    if !payload.email.contains('@') {
        return Err(AppError::InvalidInput("邮箱格式不正确".to_string()));
    }
    let id = state.ids.next();
    subscription_service::create(
        &state.pool,
        id,
        payload.monitor_id,
        payload.email.trim(),
        &payload.notify_events.join(","),
    )
    .await?;
    Ok(StatusCode::CREATED)
}

pub async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers)?;
    if id <= 0 {
        return Err(AppError::InvalidInput("无效的id".to_string()));
    }
    subscription_service::delete_by_id(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn new_verify_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn request_host(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost")
        .to_string()
}

fn forwarded_proto(headers: &HeaderMap) -> &'static str {
    let forwarded = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    if forwarded.eq_ignore_ascii_case("https") {
        "https"
    } else {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_tokens_are_long_and_unique() {
        let a = new_verify_token();
        let b = new_verify_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn proto_follows_the_forwarded_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(forwarded_proto(&headers), "http");
        headers.insert("x-forwarded-proto", "HTTPS".parse().unwrap());
        assert_eq!(forwarded_proto(&headers), "https");
    }
}
