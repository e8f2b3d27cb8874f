use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::db::models::MonitorResult;

/// Appends a probe result and refreshes the monitor's denormalized
/// `last_online` / `last_checked_at` in one transaction, so readers never
/// observe a result without the matching monitor row update.
pub async fn record_result(
    pool: &PgPool,
    monitor_id: i64,
    checked_at: DateTime<Utc>,
    online: bool,
    status_code: Option<i32>,
    response_ms: i32,
    error: Option<&str>,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO monitor_results (monitor_id, checked_at, online, status_code, response_ms, error) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(monitor_id)
    .bind(checked_at)
    .bind(online)
    .bind(status_code)
    .bind(response_ms)
    .bind(error.filter(|e| !e.is_empty()))
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE monitors SET last_online = $1, last_checked_at = $2 WHERE id = $3")
        .bind(online)
        .bind(checked_at)
        .bind(monitor_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}

pub async fn latest_result(
    pool: &PgPool,
    monitor_id: i64,
) -> Result<Option<MonitorResult>, sqlx::Error> {
    sqlx::query_as::<_, MonitorResult>(
        "SELECT id, monitor_id, checked_at, online, status_code, response_ms, error \
         FROM monitor_results WHERE monitor_id = $1 ORDER BY checked_at DESC LIMIT 1",
    )
    .bind(monitor_id)
    .fetch_optional(pool)
    .await
}

pub async fn history(
    pool: &PgPool,
    monitor_id: i64,
    days: i32,
) -> Result<Vec<MonitorResult>, sqlx::Error> {
    sqlx::query_as::<_, MonitorResult>(
        "SELECT id, monitor_id, checked_at, online, status_code, response_ms, error \
         FROM monitor_results \
         WHERE monitor_id = $1 AND checked_at >= NOW() - make_interval(days => $2) \
         ORDER BY checked_at DESC",
    )
    .bind(monitor_id)
    .bind(days)
    .fetch_all(pool)
    .await
}

/// One day of aggregated probe history.
#[derive(Debug, Serialize, FromRow)]
pub struct DailyStat {
    pub day: DateTime<Utc>,
    pub online_count: i64,
    pub total_count: i64,
    pub avg_response_ms: f64,
}

pub async fn history_by_day(
    pool: &PgPool,
    monitor_id: i64,
    days: i32,
) -> Result<Vec<DailyStat>, sqlx::Error> {
    sqlx::query_as::<_, DailyStat>(
        "SELECT date_trunc('day', checked_at) AS day, \
                COUNT(*) FILTER (WHERE online) AS online_count, \
                COUNT(*) AS total_count, \
                COALESCE(AVG(NULLIF(response_ms, 0)) FILTER (WHERE online), 0)::float8 AS avg_response_ms \
         FROM monitor_results \
         WHERE monitor_id = $1 AND checked_at >= NOW() - make_interval(days => $2) \
         GROUP BY day ORDER BY day DESC",
    )
    .bind(monitor_id)
    .bind(days)
    .fetch_all(pool)
    .await
}

/// Retention reaper: drops results older than `retention_days`.
pub async fn reap_old_results(pool: &PgPool, retention_days: i32) -> Result<u64, sqlx::Error> {
    let days = if retention_days <= 0 { 30 } else { retention_days };
    let result =
        sqlx::query("DELETE FROM monitor_results WHERE checked_at < NOW() - make_interval(days => $1)")
            .bind(days)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}
