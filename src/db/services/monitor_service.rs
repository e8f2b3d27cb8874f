use serde::Deserialize;
use sqlx::PgPool;

use crate::db::models::Monitor;

const MONITOR_COLUMNS: &str = "id, name, url, method, headers, body, expected_status_min, \
     expected_status_max, keyword, group_id, interval_seconds, flap_threshold, \
     notify_cooldown_minutes, last_online, last_checked_at";

/// Request payload shared by create and update.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorPayload {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub headers: Option<serde_json::Value>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub expected_status_min: i32,
    #[serde(default)]
    pub expected_status_max: i32,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub interval_seconds: i32,
    #[serde(default)]
    pub flap_threshold: Option<i32>,
    #[serde(default)]
    pub notify_cooldown_minutes: Option<i32>,
}

impl MonitorPayload {
    /// Fills the defaults the API contract promises: GET method and a
    /// 200–299 acceptance window when none is given.
    pub fn normalized(mut self) -> Self {
        if self.method.trim().is_empty() {
            self.method = "GET".to_string();
        }
        if self.expected_status_min == 0 && self.expected_status_max == 0 {
            self.expected_status_min = 200;
            self.expected_status_max = 299;
        }
        if self.headers.is_none() {
            self.headers = Some(serde_json::json!({}));
        }
        self
    }
}

pub async fn list_monitors(pool: &PgPool) -> Result<Vec<Monitor>, sqlx::Error> {
    sqlx::query_as::<_, Monitor>(&format!(
        "SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY id"
    ))
    .fetch_all(pool)
    .await
}

pub async fn get_monitor(pool: &PgPool, id: i64) -> Result<Option<Monitor>, sqlx::Error> {
    sqlx::query_as::<_, Monitor>(&format!(
        "SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn create_monitor(
    pool: &PgPool,
    id: i64,
    p: &MonitorPayload,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO monitors (id, name, url, method, headers, body, expected_status_min, \
         expected_status_max, keyword, group_id, interval_seconds, flap_threshold, \
         notify_cooldown_minutes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(id)
    .bind(&p.name)
    .bind(&p.url)
    .bind(&p.method)
    .bind(&p.headers)
    .bind(&p.body)
    .bind(p.expected_status_min)
    .bind(p.expected_status_max)
    .bind(&p.keyword)
    .bind(p.group_id)
    .bind(p.interval_seconds)
    .bind(p.flap_threshold)
    .bind(p.notify_cooldown_minutes)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_monitor(
    pool: &PgPool,
    id: i64,
    p: &MonitorPayload,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE monitors SET name = $1, url = $2, method = $3, headers = $4, body = $5, \
         expected_status_min = $6, expected_status_max = $7, keyword = $8, group_id = $9, \
         interval_seconds = $10, flap_threshold = $11, notify_cooldown_minutes = $12 \
         WHERE id = $13",
    )
    .bind(&p.name)
    .bind(&p.url)
    .bind(&p.method)
    .bind(&p.headers)
    .bind(&p.body)
    .bind(p.expected_status_min)
    .bind(p.expected_status_max)
    .bind(&p.keyword)
    .bind(p.group_id)
    .bind(p.interval_seconds)
    .bind(p.flap_threshold)
    .bind(p.notify_cooldown_minutes)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Cascades to results, state, ssl facts, notifications and subscriptions.
pub async fn delete_monitor(pool: &PgPool, id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM monitors WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_fills_method_and_status_window() {
        let p: MonitorPayload = serde_json::from_value(serde_json::json!({
            "name": "example", "url": "https://example.com"
        }))
        .unwrap();
        let p = p.normalized();
        assert_eq!(p.method, "GET");
        assert_eq!(p.expected_status_min, 200);
        assert_eq!(p.expected_status_max, 299);
        assert_eq!(p.headers, Some(serde_json::json!({})));
    }

    #[test]
    fn normalize_keeps_explicit_values() {
        let p: MonitorPayload = serde_json::from_value(serde_json::json!({
            "name": "api", "url": "https://api.example.com", "method": "POST",
            "expected_status_min": 200, "expected_status_max": 204
        }))
        .unwrap();
        let p = p.normalized();
        assert_eq!(p.method, "POST");
        assert_eq!(p.expected_status_max, 204);
    }
}
