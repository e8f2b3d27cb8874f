use serde::Deserialize;
use sqlx::PgPool;

use crate::db::models::MonitorGroup;

#[derive(Debug, Deserialize)]
pub struct GroupPayload {
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

pub async fn list_groups(pool: &PgPool) -> Result<Vec<MonitorGroup>, sqlx::Error> {
    sqlx::query_as::<_, MonitorGroup>("SELECT id, name, icon, color FROM monitor_groups ORDER BY id")
        .fetch_all(pool)
        .await
}

pub async fn create_group(pool: &PgPool, id: i64, p: &GroupPayload) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO monitor_groups (id, name, icon, color) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(&p.name)
        .bind(&p.icon)
        .bind(&p.color)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_group(pool: &PgPool, id: i64, p: &GroupPayload) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("UPDATE monitor_groups SET name = $1, icon = $2, color = $3 WHERE id = $4")
            .bind(&p.name)
            .bind(&p.icon)
            .bind(&p.color)
            .bind(id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}

/// Deleting a group nulls `monitors.group_id` via the FK action.
pub async fn delete_group(pool: &PgPool, id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM monitor_groups WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
