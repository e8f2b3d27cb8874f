use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

/// Kind column values for the notification log.
pub const KIND_STATUS_CHANGE: &str = "status_change";
pub const KIND_SSL_EXPIRY: &str = "ssl_expiry";

/// The offline message marker the recovery gate keys on.
pub const OFFLINE_MARKER: &str = "发生异常";

pub async fn append(
    pool: &PgPool,
    monitor_id: i64,
    kind: &str,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO notifications (monitor_id, type, message) VALUES ($1, $2, $3)")
        .bind(monitor_id)
        .bind(kind)
        .bind(message)
        .execute(pool)
        .await?;
    Ok(())
}

/// Timestamp of the most recent notification of `kind`, if any.
pub async fn last_notification_at(
    pool: &PgPool,
    monitor_id: i64,
    kind: &str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar::<_, DateTime<Utc>>(
        "SELECT created_at FROM notifications \
         WHERE monitor_id = $1 AND type = $2 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(monitor_id)
    .bind(kind)
    .fetch_optional(pool)
    .await
}

/// Whether an offline status_change notice was ever recorded for the
/// monitor. Recovery notices are suppressed until this is true.
pub async fn had_prior_offline(pool: &PgPool, monitor_id: i64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM notifications \
         WHERE monitor_id = $1 AND type = $2 AND message LIKE $3 LIMIT 1)",
    )
    .bind(monitor_id)
    .bind(KIND_STATUS_CHANGE)
    .bind(format!("%{OFFLINE_MARKER}%"))
    .fetch_one(pool)
    .await
}

/// A log row joined with its monitor name for the admin listing.
#[derive(Debug, Serialize, FromRow)]
pub struct NotificationListItem {
    pub id: i64,
    pub monitor_id: i64,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub message: Option<String>,
    pub monitor_name: String,
}

pub async fn list_recent(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<NotificationListItem>, sqlx::Error> {
    sqlx::query_as::<_, NotificationListItem>(
        "SELECT n.id, n.monitor_id, n.created_at, n.type, n.message, m.name AS monitor_name \
         FROM notifications n \
         JOIN monitors m ON m.id = n.monitor_id \
         ORDER BY n.created_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
