use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::db::models::{Monitor, Settings};
use crate::db::services::{notification_log_service as log, subscription_service, user_service};
use crate::notifications::{Mailer, Templates};

/// Notification policy: decides whether a confirmed transition or an SSL
/// expiry indication becomes a notification record and outgoing mail.
/// Mail delivery is fire-and-forget; the record is written on every policy
/// pass even when no transport is configured.
pub struct NotificationGate {
    pool: PgPool,
    mailer: Mailer,
    templates: Arc<Templates>,
}

impl NotificationGate {
    pub fn new(pool: PgPool, mailer: Mailer, templates: Arc<Templates>) -> Self {
        NotificationGate {
            pool,
            mailer,
            templates,
        }
    }

    /// Applies the status-change policy. Returns whether a record was written.
    pub async fn handle_status_change(
        &self,
        monitor: &Monitor,
        settings: &Settings,
        online: bool,
        status_code: Option<i32>,
        error: &str,
        message: &str,
    ) -> Result<bool, sqlx::Error> {
        if !settings.enable_notifications {
            return Ok(false);
        }
        let want = event_key(online);
        if !event_selected(&settings.notify_events, want) {
            return Ok(false);
        }
        // A first-ever recovery is not news.
        if online && !log::had_prior_offline(&self.pool, monitor.id).await? {
            return Ok(false);
        }
        let cooldown = effective_cooldown_minutes(
            monitor.notify_cooldown_minutes,
            settings.notify_cooldown_minutes,
        );
        let last = log::last_notification_at(&self.pool, monitor.id, log::KIND_STATUS_CHANGE).await?;
        if !cooldown_allows(last, Utc::now(), cooldown) {
            return Ok(false);
        }

        let recipients = self.recipients_for(monitor.id, want, settings).await?;
        if !recipients.is_empty() {
            let subject =
                crate::notifications::templates::subject_status_change(online, &monitor.name, &settings.site_name);
            match self.templates.body_status_change(
                &settings.site_name,
                &monitor.name,
                &monitor.url,
                online,
                &Utc::now().to_rfc3339(),
                status_code.unwrap_or(0),
                error,
            ) {
                Ok(html) => self.dispatch(settings, &recipients, &subject, &html),
                Err(e) => warn!(monitor_id = monitor.id, error = %e, "邮件模板渲染失败"),
            }
        }

        log::append(&self.pool, monitor.id, log::KIND_STATUS_CHANGE, message).await?;
        info!(monitor_id = monitor.id, online = online, "已记录状态变更通知");
        Ok(true)
    }

    /// Applies the SSL expiry policy. Returns whether a record was written.
    pub async fn handle_ssl_expiry(
        &self,
        monitor: &Monitor,
        settings: &Settings,
        days_left: i32,
        expires_at: DateTime<Utc>,
        message: &str,
    ) -> Result<bool, sqlx::Error> {
        if !settings.enable_notifications {
            return Ok(false);
        }
        if !event_selected(&settings.notify_events, "ssl_expiry") {
            return Ok(false);
        }
        let cooldown = effective_cooldown_minutes(
            monitor.notify_cooldown_minutes,
            settings.notify_cooldown_minutes,
        );
        let last = log::last_notification_at(&self.pool, monitor.id, log::KIND_SSL_EXPIRY).await?;
        if !cooldown_allows(last, Utc::now(), cooldown) {
            return Ok(false);
        }

        let recipients = self.recipients_for(monitor.id, "ssl_expiry", settings).await?;
        if !recipients.is_empty() {
            let subject =
                crate::notifications::templates::subject_ssl_expiry(&monitor.name, &settings.site_name);
            match self.templates.body_ssl_expiry(
                &settings.site_name,
                &monitor.name,
                &monitor.url,
                days_left,
                &expires_at.to_rfc3339(),
                &Utc::now().to_rfc3339(),
            ) {
                Ok(html) => self.dispatch(settings, &recipients, &subject, &html),
                Err(e) => warn!(monitor_id = monitor.id, error = %e, "邮件模板渲染失败"),
            }
        }

        log::append(&self.pool, monitor.id, log::KIND_SSL_EXPIRY, message).await?;
        info!(monitor_id = monitor.id, days_left = days_left, "已记录证书到期通知");
        Ok(true)
    }

    /// Union of the configured admin recipients and the monitor's verified
    /// subscribers for this event, falling back to the first admin user.
    async fn recipients_for(
        &self,
        monitor_id: i64,
        want: &str,
        settings: &Settings,
    ) -> Result<Vec<String>, sqlx::Error> {
        let subs = subscription_service::list_verified(&self.pool, monitor_id).await?;
        let mut recipients = build_recipients(&settings.to_emails, &subs, want);
        if recipients.is_empty() {
            if let Some(admin) = user_service::default_recipient_email(&self.pool).await? {
                if !admin.trim().is_empty() {
                    recipients.push(admin);
                }
            }
        }
        Ok(recipients)
    }

    /// Hands each message to the mail transport without awaiting delivery;
    /// transport failures are logged and do not roll anything back.
    fn dispatch(&self, settings: &Settings, recipients: &[String], subject: &str, html: &str) {
        for to in recipients {
            let mailer = self.mailer.clone();
            let settings = settings.clone();
            let to = to.clone();
            let subject = subject.to_string();
            let html = html.to_string();
            tokio::spawn(async move {
                if let Err(e) = mailer.send(&settings, &to, &subject, &html).await {
                    warn!(to = %to, error = %e, "通知邮件发送失败");
                }
            });
        }
    }
}

pub fn event_key(online: bool) -> &'static str {
    if online {
        "online"
    } else {
        "offline"
    }
}

/// Per-monitor override wins when positive; zero disables the cooldown.
pub fn effective_cooldown_minutes(monitor_override: Option<i32>, settings_value: i32) -> i32 {
    match monitor_override {
        Some(v) if v > 0 => v,
        _ => settings_value,
    }
}

pub fn cooldown_allows(
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown_minutes: i32,
) -> bool {
    if cooldown_minutes <= 0 {
        return true;
    }
    match last {
        None => true,
        Some(t) => now - t >= Duration::minutes(cooldown_minutes as i64),
    }
}

pub fn event_selected(enabled: &[String], want: &str) -> bool {
    enabled.iter().any(|e| e.trim().eq_ignore_ascii_case(want))
}

/// Admin list plus matching verified subscribers, in that order.
pub fn build_recipients(
    to_emails: &str,
    subscriptions: &[(String, String)],
    want: &str,
) -> Vec<String> {
    let mut recipients: Vec<String> =
        crate::db::services::settings_service::split_csv(to_emails);
    for (email, events) in subscriptions {
        let email = email.trim();
        if email.is_empty() {
            continue;
        }
        let subscribed = events
            .split(',')
            .any(|e| e.trim().eq_ignore_ascii_case(want));
        if subscribed && !recipients.iter().any(|r| r == email) {
            recipients.push(email.to_string());
        }
    }
    recipients
}

pub fn status_change_message(name: &str, online: bool, status_code: i32, error: &str) -> String {
    let status = if online { "恢复在线" } else { "发生异常" };
    format!("站点「{name}」{status}，状态码={status_code}, 错误={error}")
}

pub fn ssl_expiry_message(name: &str, days_left: i32, expires_at: DateTime<Utc>) -> String {
    format!(
        "站点「{name}」SSL 证书还有 {days_left} 天过期（{}）",
        expires_at.to_rfc3339()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_disabled_always_allows() {
        let now = Utc::now();
        assert!(cooldown_allows(Some(now), now, 0));
        assert!(cooldown_allows(Some(now), now, -1));
    }

    #[test]
    fn cooldown_blocks_within_window_and_allows_after() {
        let now = Utc::now();
        let three_minutes_ago = now - Duration::minutes(3);
        assert!(!cooldown_allows(Some(three_minutes_ago), now, 10));
        let eleven_minutes_ago = now - Duration::minutes(11);
        assert!(cooldown_allows(Some(eleven_minutes_ago), now, 10));
        assert!(cooldown_allows(None, now, 10));
    }

    #[test]
    fn per_monitor_cooldown_override_wins_when_positive() {
        assert_eq!(effective_cooldown_minutes(Some(5), 30), 5);
        assert_eq!(effective_cooldown_minutes(Some(0), 30), 30);
        assert_eq!(effective_cooldown_minutes(None, 30), 30);
    }

    #[test]
    fn recipients_union_admin_and_matching_subscribers() {
        let subs = vec![
            ("sub@example.com".to_string(), "online,offline".to_string()),
            ("ssl-only@example.com".to_string(), "ssl_expiry".to_string()),
            ("admin@example.com".to_string(), "offline".to_string()),
        ];
        let recipients = build_recipients("admin@example.com, ops@example.com", &subs, "offline");
        assert_eq!(
            recipients,
            vec!["admin@example.com", "ops@example.com", "sub@example.com"]
        );
    }

    #[test]
    fn recipients_empty_when_nothing_matches() {
        let subs = vec![("a@example.com".to_string(), "online".to_string())];
        assert!(build_recipients("", &subs, "ssl_expiry").is_empty());
    }

    #[test]
    fn event_selection_is_case_insensitive() {
        let enabled = vec!["Online".to_string(), " offline ".to_string()];
        assert!(event_selected(&enabled, "online"));
        assert!(event_selected(&enabled, "offline"));
        assert!(!event_selected(&enabled, "ssl_expiry"));
    }

    #[test]
    fn status_message_carries_the_gate_markers() {
        assert!(status_change_message("API", false, 502, "timeout").contains("发生异常"));
        assert!(status_change_message("API", true, 200, "").contains("恢复在线"));
    }

    #[test]
    fn ssl_message_names_days_left() {
        let msg = ssl_expiry_message("API", 10, Utc::now());
        assert!(msg.contains("还有 10 天过期"));
    }
}
