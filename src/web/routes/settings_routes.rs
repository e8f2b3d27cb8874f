use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::db::models::Settings;
use crate::db::services::settings_service::{self, SettingsUpdate};
use crate::web::auth::require_admin;
use crate::web::{AppError, AppState};

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Settings>, AppError> {
    Ok(Json(
        settings_service::load_settings(&state.pool, &state.cfg).await?,
    ))
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SettingsUpdate>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers)?;
    settings_service::update_settings(&state.pool, &payload).await?;
    Ok(StatusCode::NO_CONTENT)
}
