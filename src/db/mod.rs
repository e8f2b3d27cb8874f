use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

pub mod models;
pub mod services;

/// Opens a Postgres pool with the connection limits used in production.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(25)
        .min_connections(2)
        .max_lifetime(Duration::from_secs(5 * 60))
        .idle_timeout(Duration::from_secs(60))
        .connect(database_url)
        .await
}

/// Applies the idempotent schema. Safe to run at every startup.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    let stmts = [
        r#"CREATE TABLE IF NOT EXISTS monitor_groups (
            id BIGINT PRIMARY KEY,
            name TEXT NOT NULL,
            icon TEXT,
            color TEXT
        )"#,
        r#"CREATE TABLE IF NOT EXISTS monitors (
            id BIGINT PRIMARY KEY,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            method TEXT NOT NULL DEFAULT 'GET',
            headers JSONB DEFAULT '{}'::jsonb,
            body TEXT,
            expected_status_min INT NOT NULL DEFAULT 200,
            expected_status_max INT NOT NULL DEFAULT 299,
            keyword TEXT,
            group_id BIGINT REFERENCES monitor_groups(id) ON DELETE SET NULL,
            interval_seconds INT NOT NULL DEFAULT 60,
            flap_threshold INT,
            notify_cooldown_minutes INT,
            last_online BOOLEAN,
            last_checked_at TIMESTAMPTZ
        )"#,
        r#"CREATE TABLE IF NOT EXISTS monitor_results (
            id BIGSERIAL PRIMARY KEY,
            monitor_id BIGINT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
            checked_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            online BOOLEAN NOT NULL,
            status_code INT,
            response_ms INT,
            error TEXT
        )"#,
        r#"CREATE TABLE IF NOT EXISTS monitor_state (
            monitor_id BIGINT PRIMARY KEY REFERENCES monitors(id) ON DELETE CASCADE,
            last_reported_online BOOLEAN,
            online_streak INT NOT NULL DEFAULT 0,
            offline_streak INT NOT NULL DEFAULT 0
        )"#,
        r#"CREATE TABLE IF NOT EXISTS ssl_info (
            monitor_id BIGINT PRIMARY KEY REFERENCES monitors(id) ON DELETE CASCADE,
            expires_at TIMESTAMPTZ,
            issuer TEXT,
            days_left INT
        )"#,
        r#"CREATE TABLE IF NOT EXISTS notifications (
            id BIGSERIAL PRIMARY KEY,
            monitor_id BIGINT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            type TEXT NOT NULL,
            message TEXT
        )"#,
        r#"CREATE TABLE IF NOT EXISTS monitor_subscriptions (
            id BIGINT PRIMARY KEY,
            monitor_id BIGINT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
            email TEXT NOT NULL,
            notify_events TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            verified BOOLEAN NOT NULL DEFAULT FALSE,
            verify_token TEXT,
            verify_expires TIMESTAMPTZ
        )"#,
        r#"CREATE TABLE IF NOT EXISTS admin_users (
            id SERIAL PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"#,
        r#"CREATE TABLE IF NOT EXISTS app_settings (
            id SERIAL PRIMARY KEY,
            addr TEXT,
            database_url TEXT,
            resend_api_key TEXT,
            alert_before_days INT,
            check_interval_seconds INT
        )"#,
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS site_name TEXT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS subtitle TEXT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS tab_subtitle TEXT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS debounce_seconds INT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS enable_notifications BOOLEAN",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS notify_events TEXT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS smtp_server TEXT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS smtp_port INT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS smtp_user TEXT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS smtp_password TEXT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS from_email TEXT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS to_emails TEXT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS retention_days INT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS flap_threshold INT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS stabilize_count INT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS notify_cooldown_minutes INT",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS show_system_status BOOLEAN DEFAULT FALSE",
        "ALTER TABLE app_settings ADD COLUMN IF NOT EXISTS status_monitor_id BIGINT",
        "CREATE INDEX IF NOT EXISTS idx_monitor_results_monitor_id ON monitor_results(monitor_id)",
        "CREATE INDEX IF NOT EXISTS idx_monitor_results_checked_at ON monitor_results(checked_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_monitor_results_monitor_checked ON monitor_results(monitor_id, checked_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_notifications_monitor_id ON notifications(monitor_id)",
        "CREATE INDEX IF NOT EXISTS idx_notifications_created_at ON notifications(created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_notifications_type ON notifications(type)",
        "CREATE INDEX IF NOT EXISTS idx_sub_monitor ON monitor_subscriptions(monitor_id)",
        "CREATE INDEX IF NOT EXISTS idx_sub_email ON monitor_subscriptions(email)",
        "CREATE INDEX IF NOT EXISTS idx_sub_verify_token ON monitor_subscriptions(verify_token) WHERE verify_token IS NOT NULL",
        "CREATE INDEX IF NOT EXISTS idx_monitors_group_id ON monitors(group_id)",
    ];
    for stmt in stmts {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
