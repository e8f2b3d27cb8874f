use serde::Deserialize;
use sqlx::{FromRow, PgPool};

use crate::config::Config;
use crate::db::models::Settings;

/// The raw singleton row; every tunable is nullable so that the effective
/// value can fall back to the process configuration.
#[derive(Debug, FromRow)]
struct AppSettingsRow {
    site_name: Option<String>,
    subtitle: Option<String>,
    tab_subtitle: Option<String>,
    enable_notifications: Option<bool>,
    notify_events: Option<String>,
    smtp_server: Option<String>,
    smtp_port: Option<i32>,
    smtp_user: Option<String>,
    smtp_password: Option<String>,
    from_email: Option<String>,
    to_emails: Option<String>,
    retention_days: Option<i32>,
    flap_threshold: Option<i32>,
    check_interval_seconds: Option<i32>,
    stabilize_count: Option<i32>,
    notify_cooldown_minutes: Option<i32>,
    alert_before_days: Option<i32>,
}

pub const DEFAULT_SITE_NAME: &str = "服务监控系统";

fn default_events() -> Vec<String> {
    vec![
        "online".to_string(),
        "offline".to_string(),
        "ssl_expiry".to_string(),
    ]
}

/// Splits a comma-separated list, trimming blanks.
pub fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}

/// Effective settings: latest row (`ORDER BY id DESC LIMIT 1`) with NULLs
/// resolved against the environment defaults.
pub async fn load_settings(pool: &PgPool, cfg: &Config) -> Result<Settings, sqlx::Error> {
    let row = sqlx::query_as::<_, AppSettingsRow>(
        "SELECT site_name, subtitle, tab_subtitle, enable_notifications, notify_events, \
                smtp_server, smtp_port, smtp_user, smtp_password, from_email, to_emails, \
                retention_days, flap_threshold, check_interval_seconds, stabilize_count, \
                notify_cooldown_minutes, alert_before_days \
         FROM app_settings ORDER BY id DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?
    .unwrap_or(AppSettingsRow {
        site_name: None,
        subtitle: None,
        tab_subtitle: None,
        enable_notifications: None,
        notify_events: None,
        smtp_server: None,
        smtp_port: None,
        smtp_user: None,
        smtp_password: None,
        from_email: None,
        to_emails: None,
        retention_days: None,
        flap_threshold: None,
        check_interval_seconds: None,
        stabilize_count: None,
        notify_cooldown_minutes: None,
        alert_before_days: None,
    });

    let notify_events = row
        .notify_events
        .as_deref()
        .map(split_csv)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(default_events);

    Ok(Settings {
        retention_days: row.retention_days.filter(|v| *v > 0).unwrap_or(cfg.retention_days),
        flap_threshold: row
            .flap_threshold
            .filter(|v| *v > 0)
            .unwrap_or(cfg.flap_threshold),
        check_interval_seconds: row
            .check_interval_seconds
            .filter(|v| *v > 0)
            .unwrap_or(cfg.default_check_interval.as_secs() as i32),
        stabilize_count: row
            .stabilize_count
            .filter(|v| *v > 0)
            .unwrap_or(cfg.stabilize_count),
        notify_cooldown_minutes: row
            .notify_cooldown_minutes
            .unwrap_or(cfg.notify_cooldown_minutes),
        alert_before_days: row
            .alert_before_days
            .filter(|v| *v > 0)
            .unwrap_or(cfg.alert_before_days),
        site_name: row
            .site_name
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SITE_NAME.to_string()),
        subtitle: row.subtitle.unwrap_or_default(),
        tab_subtitle: row.tab_subtitle.unwrap_or_default(),
        enable_notifications: row.enable_notifications.unwrap_or(true),
        notify_events,
        smtp_server: row.smtp_server.unwrap_or_default(),
        smtp_port: row.smtp_port.unwrap_or_default(),
        smtp_user: row.smtp_user.unwrap_or_default(),
        smtp_password: row.smtp_password.unwrap_or_default(),
        from_email: row.from_email.unwrap_or_default(),
        to_emails: row.to_emails.unwrap_or_default(),
    })
}

/// PUT /api/settings payload. Optional fields patch, zeros mean "unset" for
/// the numeric knobs.
#[derive(Debug, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub retention_days: i32,
    #[serde(default)]
    pub flap_threshold: i32,
    #[serde(default)]
    pub check_interval_seconds: i32,
    #[serde(default)]
    pub stabilize_count: i32,
    #[serde(default)]
    pub notify_cooldown_minutes: i32,
    #[serde(default)]
    pub alert_before_days: i32,
    pub site_name: Option<String>,
    pub subtitle: Option<String>,
    pub tab_subtitle: Option<String>,
    pub enable_notifications: Option<bool>,
    pub notify_events: Option<Vec<String>>,
    pub smtp_server: Option<String>,
    pub smtp_port: Option<i32>,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub from_email: Option<String>,
    pub to_emails: Option<String>,
}

fn none_if_zero(v: i32) -> Option<i32> {
    if v == 0 {
        None
    } else {
        Some(v)
    }
}

pub async fn update_settings(pool: &PgPool, upd: &SettingsUpdate) -> Result<(), sqlx::Error> {
    let events_csv = upd.notify_events.as_ref().map(|e| e.join(","));
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM app_settings")
        .fetch_one(pool)
        .await?;
    if count == 0 {
        sqlx::query(
            "INSERT INTO app_settings (site_name, subtitle, tab_subtitle, enable_notifications, \
             notify_events, smtp_server, smtp_port, smtp_user, smtp_password, from_email, \
             to_emails, retention_days, flap_threshold, check_interval_seconds, \
             stabilize_count, notify_cooldown_minutes, alert_before_days) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(&upd.site_name)
        .bind(&upd.subtitle)
        .bind(&upd.tab_subtitle)
        .bind(upd.enable_notifications)
        .bind(&events_csv)
        .bind(&upd.smtp_server)
        .bind(upd.smtp_port)
        .bind(&upd.smtp_user)
        .bind(&upd.smtp_password)
        .bind(&upd.from_email)
        .bind(&upd.to_emails)
        .bind(none_if_zero(upd.retention_days))
        .bind(none_if_zero(upd.flap_threshold))
        .bind(none_if_zero(upd.check_interval_seconds))
        .bind(none_if_zero(upd.stabilize_count))
        .bind(none_if_zero(upd.notify_cooldown_minutes))
        .bind(none_if_zero(upd.alert_before_days))
        .execute(pool)
        .await?;
    } else {
        sqlx::query(
            "UPDATE app_settings SET \
                site_name = COALESCE($1, site_name), \
                subtitle = COALESCE($2, subtitle), \
                tab_subtitle = COALESCE($3, tab_subtitle), \
                enable_notifications = COALESCE($4, enable_notifications), \
                notify_events = COALESCE($5, notify_events), \
                smtp_server = COALESCE($6, smtp_server), \
                smtp_port = COALESCE($7, smtp_port), \
                smtp_user = COALESCE($8, smtp_user), \
                smtp_password = COALESCE($9, smtp_password), \
                from_email = COALESCE($10, from_email), \
                to_emails = COALESCE($11, to_emails), \
                retention_days = COALESCE($12, retention_days), \
                flap_threshold = COALESCE($13, flap_threshold), \
                check_interval_seconds = COALESCE($14, check_interval_seconds), \
                stabilize_count = COALESCE($15, stabilize_count), \
                notify_cooldown_minutes = COALESCE($16, notify_cooldown_minutes), \
                alert_before_days = COALESCE($17, alert_before_days) \
             WHERE id = (SELECT id FROM app_settings ORDER BY id DESC LIMIT 1)",
        )
        .bind(&upd.site_name)
        .bind(&upd.subtitle)
        .bind(&upd.tab_subtitle)
        .bind(upd.enable_notifications)
        .bind(&events_csv)
        .bind(&upd.smtp_server)
        .bind(upd.smtp_port)
        .bind(&upd.smtp_user)
        .bind(&upd.smtp_password)
        .bind(&upd.from_email)
        .bind(&upd.to_emails)
        .bind(none_if_zero(upd.retention_days))
        .bind(none_if_zero(upd.flap_threshold))
        .bind(none_if_zero(upd.check_interval_seconds))
        .bind(none_if_zero(upd.stabilize_count))
        .bind(none_if_zero(upd.notify_cooldown_minutes))
        .bind(none_if_zero(upd.alert_before_days))
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Seeds the initial row during first-time setup.
pub async fn seed_settings(
    pool: &PgPool,
    addr: &str,
    database_url: &str,
    resend_api_key: &str,
    alert_before_days: i32,
    check_interval_seconds: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO app_settings (addr, database_url, resend_api_key, alert_before_days, \
         check_interval_seconds) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(addr)
    .bind(database_url)
    .bind(resend_api_key)
    .bind(alert_before_days)
    .bind(check_interval_seconds)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_trims_and_drops_blanks() {
        assert_eq!(
            split_csv("a@example.com, b@example.com,, "),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
        assert!(split_csv("  ").is_empty());
    }
}
