use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::db::services::user_service;
use crate::web::{AppError, AppState};

const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub admin: bool,
    pub exp: usize,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: String,
}

/// POST /api/login — admin password exchange for a bearer token. The
/// environment password wins when set, otherwise the stored admin hash.
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let env_password = &state.cfg.admin_password;
    let mut authorized = !env_password.is_empty() && payload.password == *env_password;

    if !authorized {
        if let Some(admin) = user_service::first_admin(&state.pool).await? {
            authorized = bcrypt::verify(&payload.password, &admin.password_hash)
                .unwrap_or(false);
        }
    }
    if !authorized {
        return Err(AppError::Unauthorized);
    }

    let expires_at = Utc::now() + Duration::hours(TOKEN_TTL_HOURS);
    let claims = Claims {
        admin: true,
        exp: expires_at.timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.cfg.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        warn!(error = %e, "JWT签名失败");
        AppError::InternalServerError("生成令牌失败".to_string())
    })?;

    Ok(Json(LoginResponse {
        token,
        expires_at: expires_at.to_rfc3339(),
    }))
}

/// GET /api/admin/verify — 204 when the bearer token is valid.
pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Bearer-token guard used by the mutating handlers.
pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    if admin_ok(state, headers) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

pub fn admin_ok(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(token) = bearer_token(headers) else {
        return false;
    };
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.cfg.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims.admin)
    .unwrap_or(false)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_requires_the_scheme_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
