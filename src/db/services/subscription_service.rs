use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

/// Verification window for a fresh subscription token.
pub const VERIFY_TOKEN_TTL_HOURS: i64 = 24;

/// `(email, notify_events)` pairs of verified subscribers for one monitor.
pub async fn list_verified(
    pool: &PgPool,
    monitor_id: i64,
) -> Result<Vec<(String, String)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT email, notify_events FROM monitor_subscriptions \
         WHERE monitor_id = $1 AND verified = TRUE",
    )
    .bind(monitor_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Replaces any existing subscription for the `(monitor, email)` pair with a
/// fresh unverified row carrying a one-shot token.
pub async fn create_unverified(
    pool: &PgPool,
    id: i64,
    monitor_id: i64,
    email: &str,
    notify_events: &str,
    token: &str,
) -> Result<(), sqlx::Error> {
    let expires = Utc::now() + Duration::hours(VERIFY_TOKEN_TTL_HOURS);
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM monitor_subscriptions WHERE monitor_id = $1 AND email = $2")
        .bind(monitor_id)
        .bind(email)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "INSERT INTO monitor_subscriptions \
         (id, monitor_id, email, notify_events, verified, verify_token, verify_expires) \
         VALUES ($1, $2, $3, $4, FALSE, $5, $6)",
    )
    .bind(id)
    .bind(monitor_id)
    .bind(email)
    .bind(notify_events)
    .bind(token)
    .bind(expires)
    .execute(&mut *tx)
    .await?;
    tx.commit().await
}

/// Admin-created subscription; starts unverified with no token.
pub async fn create(
    pool: &PgPool,
    id: i64,
    monitor_id: i64,
    email: &str,
    notify_events: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO monitor_subscriptions (id, monitor_id, email, notify_events) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(id)
    .bind(monitor_id)
    .bind(email)
    .bind(notify_events)
    .execute(pool)
    .await?;
    Ok(())
}

pub enum VerifyOutcome {
    Verified,
    Expired,
    NotFound,
}

/// Promotes the subscription matching `token`. Verified rows always end up
/// with the token and expiry cleared.
pub async fn verify_by_token(pool: &PgPool, token: &str) -> Result<VerifyOutcome, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64, Option<DateTime<Utc>>)>(
        "SELECT id, verify_expires FROM monitor_subscriptions WHERE verify_token = $1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;
    let (id, expires) = match row {
        Some(r) => r,
        None => return Ok(VerifyOutcome::NotFound),
    };
    if expires.map(|e| Utc::now() > e).unwrap_or(true) {
        return Ok(VerifyOutcome::Expired);
    }
    sqlx::query(
        "UPDATE monitor_subscriptions \
         SET verified = TRUE, verify_token = NULL, verify_expires = NULL WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(VerifyOutcome::Verified)
}

/// A subscription joined with its monitor name for the admin listing.
#[derive(Debug, Serialize, FromRow)]
pub struct SubscriptionListItem {
    pub id: i64,
    pub monitor_id: i64,
    pub monitor_name: String,
    pub email: String,
    pub notify_events: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

pub async fn list(
    pool: &PgPool,
    monitor_id: Option<i64>,
) -> Result<Vec<SubscriptionListItem>, sqlx::Error> {
    match monitor_id {
        Some(mid) => {
            sqlx::query_as::<_, SubscriptionListItem>(
                "SELECT s.id, s.monitor_id, m.name AS monitor_name, s.email, s.notify_events, \
                        s.verified, s.created_at \
                 FROM monitor_subscriptions s JOIN monitors m ON m.id = s.monitor_id \
                 WHERE s.monitor_id = $1 ORDER BY s.created_at DESC",
            )
            .bind(mid)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, SubscriptionListItem>(
                "SELECT s.id, s.monitor_id, m.name AS monitor_name, s.email, s.notify_events, \
                        s.verified, s.created_at \
                 FROM monitor_subscriptions s JOIN monitors m ON m.id = s.monitor_id \
                 ORDER BY s.created_at DESC",
            )
            .fetch_all(pool)
            .await
        }
    }
}

pub async fn delete_by_id(pool: &PgPool, id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM monitor_subscriptions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_by_monitor(pool: &PgPool, monitor_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM monitor_subscriptions WHERE monitor_id = $1")
        .bind(monitor_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
