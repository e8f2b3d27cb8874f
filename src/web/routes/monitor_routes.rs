use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::db::models::{Monitor, MonitorResult};
use crate::db::services::{
    monitor_service, monitor_service::MonitorPayload, result_service, state_service,
    subscription_service,
};
use crate::web::auth::require_admin;
use crate::web::{AppError, AppState};

pub async fn list_monitors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Monitor>>, AppError> {
    Ok(Json(monitor_service::list_monitors(&state.pool).await?))
}

pub async fn get_monitor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Monitor>, AppError> {
    monitor_service::get_monitor(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("监控不存在".to_string()))
}

pub async fn create_monitor(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<MonitorPayload>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers)?;
    if payload.url.trim().is_empty() || payload.name.trim().is_empty() {
        return Err(AppError::InvalidInput("name和url不能为空".to_string()));
    }
    if let Some(h) = &payload.headers {
        if !h.is_object() {
            return Err(AppError::InvalidInput("headers必须是JSON对象".to_string()));
        }
    }
    let payload = payload.normalized();
    let id = state.ids.next();
    monitor_service::create_monitor(&state.pool, id, &payload).await?;

    state.engine.clone().start_loop(id).await;
    let engine = state.engine.clone();
    tokio::spawn(async move { engine.check_once(id).await });
    Ok(StatusCode::CREATED)
}

pub async fn update_monitor(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<MonitorPayload>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers)?;
    let payload = payload.normalized();
    monitor_service::update_monitor(&state.pool, id, &payload).await?;
    state.engine.clone().restart_loop(id).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_monitor(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers)?;
    monitor_service::delete_monitor(&state.pool, id).await?;
    state.engine.stop_loop(id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub checked_at: String,
    pub online: bool,
    pub status_code: i32,
    pub response_ms: i32,
    pub error: String,
}

impl From<MonitorResult> for ResultResponse {
    fn from(r: MonitorResult) -> Self {
        ResultResponse {
            checked_at: r.checked_at.to_rfc3339(),
            online: r.online,
            status_code: r.status_code.unwrap_or(0),
            response_ms: r.response_ms.unwrap_or(0),
            error: r.error.unwrap_or_default(),
        }
    }
}

/// POST /api/monitors/{id}/run — manual probe, subject to single-flight.
pub async fn run_now(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ResultResponse>, AppError> {
    state.engine.clone().check_once(id).await;
    result_service::latest_result(&state.pool, id)
        .await?
        .map(|r| Json(r.into()))
        .ok_or_else(|| AppError::NotFound("暂无检查结果".to_string()))
}

pub async fn latest_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ResultResponse>, AppError> {
    result_service::latest_result(&state.pool, id)
        .await?
        .map(|r| Json(r.into()))
        .ok_or_else(|| AppError::NotFound("暂无检查结果".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<i32>,
    pub group: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum HistoryResponse {
    Raw(Vec<ResultResponse>),
    Daily(Vec<DailyItem>),
}

#[derive(Debug, Serialize)]
pub struct DailyItem {
    pub day: String,
    pub online_count: i64,
    pub total_count: i64,
    pub avg_response_ms: f64,
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let days = query.days.unwrap_or(30);
    if query.group.as_deref() == Some("day") {
        let stats = result_service::history_by_day(&state.pool, id, days).await?;
        let items = stats
            .into_iter()
            .map(|s| DailyItem {
                day: s.day.format("%Y-%m-%d").to_string(),
                online_count: s.online_count,
                total_count: s.total_count,
                avg_response_ms: s.avg_response_ms,
            })
            .collect();
        Ok(Json(HistoryResponse::Daily(items)))
    } else {
        let rows = result_service::history(&state.pool, id, days).await?;
        Ok(Json(HistoryResponse::Raw(
            rows.into_iter().map(Into::into).collect(),
        )))
    }
}

pub async fn delete_monitor_subscriptions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers)?;
    if let Err(e) = subscription_service::delete_by_monitor(&state.pool, id).await {
        error!(monitor_id = id, error = %e, "清空订阅失败");
        return Err(e.into());
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct SslResponse {
    pub expires_at: String,
    pub issuer: String,
    pub days_left: i32,
}

pub async fn ssl_info(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SslResponse>, AppError> {
    let info = state_service::get_ssl_info(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("SSL信息不存在".to_string()))?;
    Ok(Json(SslResponse {
        expires_at: info
            .expires_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
        issuer: info.issuer.unwrap_or_default(),
        days_left: info.days_left.unwrap_or(0),
    }))
}
