use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A monitored HTTP(S) endpoint.
/// Corresponds to the `monitors` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Monitor {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub method: String,
    /// Raw request headers as a JSON object; malformed content is tolerated
    /// by the prober and probed with an empty header set.
    pub headers: serde_json::Value,
    pub body: Option<String>,
    pub expected_status_min: i32,
    pub expected_status_max: i32,
    pub keyword: Option<String>,
    pub group_id: Option<i64>,
    pub interval_seconds: i32,
    pub flap_threshold: Option<i32>,
    pub notify_cooldown_minutes: Option<i32>,
    pub last_online: Option<bool>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Corresponds to the `monitor_groups` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MonitorGroup {
    pub id: i64,
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
}

/// One probe outcome, append-only.
/// Corresponds to the `monitor_results` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MonitorResult {
    pub id: i64,
    pub monitor_id: i64,
    pub checked_at: DateTime<Utc>,
    pub online: bool,
    pub status_code: Option<i32>,
    pub response_ms: Option<i32>,
    pub error: Option<String>,
}

/// Per-monitor streak row mutated by the state engine.
/// `last_reported_online` is tri-state: NULL until the first confirmation.
#[derive(Debug, Clone, FromRow)]
pub struct MonitorState {
    pub monitor_id: i64,
    pub last_reported_online: Option<bool>,
    pub online_streak: i32,
    pub offline_streak: i32,
}

/// Leaf certificate facts for an https monitor.
/// Corresponds to the `ssl_info` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SslInfo {
    pub monitor_id: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub issuer: Option<String>,
    pub days_left: Option<i32>,
}

/// Append-only notification log row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: i64,
    pub monitor_id: i64,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub message: Option<String>,
}

/// Per-endpoint mail subscription; unverified rows carry a one-shot token.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: i64,
    pub monitor_id: i64,
    pub email: String,
    pub notify_events: String,
    pub created_at: DateTime<Utc>,
    pub verified: bool,
    pub verify_token: Option<String>,
    pub verify_expires: Option<DateTime<Utc>>,
}

/// Corresponds to the `admin_users` table.
#[derive(Debug, Clone, FromRow)]
pub struct AdminUser {
    pub id: i32,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Effective settings snapshot: the latest `app_settings` row with defaults
/// filled in for NULL columns. This is what the engine and gate consume.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub retention_days: i32,
    pub flap_threshold: i32,
    pub check_interval_seconds: i32,
    pub stabilize_count: i32,
    pub notify_cooldown_minutes: i32,
    pub alert_before_days: i32,
    pub site_name: String,
    pub subtitle: String,
    pub tab_subtitle: String,
    pub enable_notifications: bool,
    pub notify_events: Vec<String>,
    pub smtp_server: String,
    pub smtp_port: i32,
    pub smtp_user: String,
    pub smtp_password: String,
    pub from_email: String,
    pub to_emails: String,
}

impl Settings {
    pub fn smtp_configured(&self) -> bool {
        !self.smtp_server.trim().is_empty()
            && self.smtp_port > 0
            && !self.smtp_user.trim().is_empty()
            && !self.smtp_password.trim().is_empty()
            && !self.from_email.trim().is_empty()
    }
}
