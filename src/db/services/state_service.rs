use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db::models::{MonitorState, SslInfo};

/// Loads the streak row, defaulting to the unconfirmed zero state for
/// monitors that have never been probed.
pub async fn load_state(pool: &PgPool, monitor_id: i64) -> Result<MonitorState, sqlx::Error> {
    let row = sqlx::query_as::<_, MonitorState>(
        "SELECT monitor_id, last_reported_online, online_streak, offline_streak \
         FROM monitor_state WHERE monitor_id = $1",
    )
    .bind(monitor_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.unwrap_or(MonitorState {
        monitor_id,
        last_reported_online: None,
        online_streak: 0,
        offline_streak: 0,
    }))
}

pub async fn upsert_state(pool: &PgPool, state: &MonitorState) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO monitor_state (monitor_id, last_reported_online, online_streak, offline_streak) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (monitor_id) DO UPDATE SET \
             last_reported_online = EXCLUDED.last_reported_online, \
             online_streak = EXCLUDED.online_streak, \
             offline_streak = EXCLUDED.offline_streak",
    )
    .bind(state.monitor_id)
    .bind(state.last_reported_online)
    .bind(state.online_streak)
    .bind(state.offline_streak)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_ssl_info(
    pool: &PgPool,
    monitor_id: i64,
    expires_at: DateTime<Utc>,
    issuer: &str,
    days_left: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO ssl_info (monitor_id, expires_at, issuer, days_left) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (monitor_id) DO UPDATE SET \
             expires_at = EXCLUDED.expires_at, \
             issuer = EXCLUDED.issuer, \
             days_left = EXCLUDED.days_left",
    )
    .bind(monitor_id)
    .bind(expires_at)
    .bind(issuer)
    .bind(days_left)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_ssl_info(pool: &PgPool, monitor_id: i64) -> Result<Option<SslInfo>, sqlx::Error> {
    sqlx::query_as::<_, SslInfo>(
        "SELECT monitor_id, expires_at, issuer, days_left FROM ssl_info WHERE monitor_id = $1",
    )
    .bind(monitor_id)
    .fetch_optional(pool)
    .await
}
