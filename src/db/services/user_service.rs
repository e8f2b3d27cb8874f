use sqlx::PgPool;

use crate::db::models::AdminUser;

/// First admin account by insertion order; its email is the fallback
/// notification recipient.
pub async fn default_recipient_email(pool: &PgPool) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT email FROM admin_users ORDER BY id LIMIT 1")
        .fetch_optional(pool)
        .await
}

pub async fn first_admin(pool: &PgPool) -> Result<Option<AdminUser>, sqlx::Error> {
    sqlx::query_as::<_, AdminUser>(
        "SELECT id, email, password_hash, created_at FROM admin_users ORDER BY id LIMIT 1",
    )
    .fetch_optional(pool)
    .await
}

pub async fn admin_count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM admin_users")
        .fetch_one(pool)
        .await
}

pub async fn upsert_admin(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO admin_users (email, password_hash) VALUES ($1, $2) \
         ON CONFLICT (email) DO UPDATE SET password_hash = EXCLUDED.password_hash",
    )
    .bind(email)
    .bind(password_hash)
    .execute(pool)
    .await?;
    Ok(())
}
