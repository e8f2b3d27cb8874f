use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::db::models::MonitorGroup;
use crate::db::services::group_service::{self, GroupPayload};
use crate::web::auth::require_admin;
use crate::web::{AppError, AppState};

pub async fn list_groups(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MonitorGroup>>, AppError> {
    Ok(Json(group_service::list_groups(&state.pool).await?))
}

pub async fn create_group(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<GroupPayload>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers)?;
    if payload.name.trim().is_empty() {
        return Err(AppError::InvalidInput("分组名称不能为空".to_string()));
    }
    let id = state.ids.next();
    group_service::create_group(&state.pool, id, &payload).await?;
    Ok(StatusCode::CREATED)
}

pub async fn update_group(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<GroupPayload>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers)?;
    group_service::update_group(&state.pool, id, &payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers)?;
    group_service::delete_group(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
