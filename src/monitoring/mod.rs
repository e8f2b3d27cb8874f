use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::db::models::{Monitor, Settings};
use crate::db::services::{monitor_service, result_service, settings_service, state_service};
use crate::notifications::{Mailer, Templates};

pub mod events;
pub mod gate;
pub mod prober;
pub mod state;
pub mod tls;

use events::{EventBus, Update, EVENT_SSL_EXPIRY, EVENT_STATUS_CHANGE};
use gate::NotificationGate;
use state::StateParams;

const SUPERVISOR_PERIOD: Duration = Duration::from_secs(60);
const SUPERVISOR_RETRY: Duration = Duration::from_secs(5);

/// Owns the per-monitor probe loops. The supervisor task reconciles the loop
/// set against the database once a minute; API-driven start/restart/stop
/// calls shorten that latency but the supervisor remains the authority.
pub struct MonitorEngine {
    pool: PgPool,
    cfg: Config,
    bus: Arc<EventBus>,
    gate: NotificationGate,
    loops: Mutex<HashMap<i64, LoopHandle>>,
    /// Single-flight set: monitors with a probe currently in progress.
    running: Mutex<HashSet<i64>>,
}

struct LoopHandle {
    interval: Duration,
    stop: broadcast::Sender<()>,
}

impl MonitorEngine {
    pub fn new(
        pool: PgPool,
        cfg: Config,
        bus: Arc<EventBus>,
        mailer: Mailer,
        templates: Arc<Templates>,
    ) -> Arc<Self> {
        let gate = NotificationGate::new(pool.clone(), mailer, templates);
        Arc::new(MonitorEngine {
            pool,
            cfg,
            bus,
            gate,
            loops: Mutex::new(HashMap::new()),
            running: Mutex::new(HashSet::new()),
        })
    }

    /// Spawns the supervisor and the daily sweep. Call once at startup.
    pub fn start(self: Arc<Self>) {
        let engine = Arc::clone(&self);
        tokio::spawn(async move { engine.daily_sweep_loop().await });
        tokio::spawn(async move { self.supervisor_loop().await });
    }

    async fn supervisor_loop(self: Arc<Self>) {
        info!("任务调度启动");
        loop {
            let monitors = match monitor_service::list_monitors(&self.pool).await {
                Ok(ms) => ms,
                Err(e) => {
                    error!(error = %e, "获取监控列表失败");
                    tokio::time::sleep(SUPERVISOR_RETRY).await;
                    continue;
                }
            };
            let settings = match settings_service::load_settings(&self.pool, &self.cfg).await {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "读取设置失败");
                    tokio::time::sleep(SUPERVISOR_RETRY).await;
                    continue;
                }
            };
            debug!(count = monitors.len(), "调度器扫描站点");

            let mut active = HashSet::new();
            for m in &monitors {
                let interval =
                    Duration::from_secs(effective_interval_secs(m, &settings).max(1) as u64);
                active.insert(m.id);

                let replaced = {
                    let mut loops = self.loops.lock().unwrap();
                    let current = loops.get(&m.id).map(|h| h.interval);
                    match current {
                        Some(existing) if existing == interval => None,
                        current => {
                            let is_new = current.is_none();
                            if let Some(old) = loops.remove(&m.id) {
                                let _ = old.stop.send(());
                            }
                            let (tx, rx) = broadcast::channel(1);
                            loops.insert(m.id, LoopHandle { interval, stop: tx });
                            Some((rx, is_new))
                        }
                    }
                };

                if let Some((rx, is_new)) = replaced {
                    if is_new {
                        info!(monitor_id = m.id, interval_secs = interval.as_secs(), "启动监控循环");
                    } else {
                        info!(monitor_id = m.id, interval_secs = interval.as_secs(), "调整监控循环");
                    }
                    self.clone().check_once(m.id).await;
                    self.clone().spawn_loop(m.id, interval, rx);
                }
            }

            {
                let mut loops = self.loops.lock().unwrap();
                loops.retain(|id, handle| {
                    let keep = active.contains(id);
                    if !keep {
                        let _ = handle.stop.send(());
                        info!(monitor_id = *id, "停止已删除站点的监控循环");
                    }
                    keep
                });
            }

            tokio::time::sleep(SUPERVISOR_PERIOD).await;
        }
    }

    /// One probe loop: first tick aligned to the interval grid, then a fixed
    /// cadence. Stopping is cooperative; an in-flight probe always finishes
    /// and only the next tick is suppressed.
    fn spawn_loop(self: Arc<Self>, id: i64, interval: Duration, mut stop: broadcast::Receiver<()>) {
        tokio::spawn(async move {
            let delay = grid_delay(
                Utc::now().timestamp_nanos_opt().unwrap_or_default(),
                interval,
            );
            debug!(monitor_id = id, delay_ms = delay.as_millis() as u64, "首次对齐触发");
            tokio::select! {
                _ = stop.recv() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            self.clone().check_once(id).await;

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.recv() => return,
                    _ = ticker.tick() => {
                        debug!(monitor_id = id, "触发定时检查");
                        self.clone().check_once(id).await;
                    }
                }
            }
        });
    }

    /// Starts a loop for a freshly created monitor if none is running.
    pub async fn start_loop(self: Arc<Self>, id: i64) {
        let interval = match self.interval_for(id).await {
            Ok(i) => i,
            Err(e) => {
                error!(monitor_id = id, error = %e, "读取监控间隔失败");
                return;
            }
        };
        let rx = {
            let mut loops = self.loops.lock().unwrap();
            if loops.contains_key(&id) {
                return;
            }
            let (tx, rx) = broadcast::channel(1);
            loops.insert(id, LoopHandle { interval, stop: tx });
            rx
        };
        info!(monitor_id = id, interval_secs = interval.as_secs(), "启动监控循环");
        self.spawn_loop(id, interval, rx);
    }

    /// Replaces the loop after a monitor update.
    pub async fn restart_loop(self: Arc<Self>, id: i64) {
        let interval = match self.interval_for(id).await {
            Ok(i) => i,
            Err(e) => {
                error!(monitor_id = id, error = %e, "读取监控间隔失败");
                return;
            }
        };
        let rx = {
            let mut loops = self.loops.lock().unwrap();
            if let Some(old) = loops.remove(&id) {
                let _ = old.stop.send(());
            }
            let (tx, rx) = broadcast::channel(1);
            loops.insert(id, LoopHandle { interval, stop: tx });
            rx
        };
        info!(monitor_id = id, interval_secs = interval.as_secs(), "重启监控循环");
        self.spawn_loop(id, interval, rx);
    }

    pub fn stop_loop(&self, id: i64) {
        let mut loops = self.loops.lock().unwrap();
        if let Some(handle) = loops.remove(&id) {
            let _ = handle.stop.send(());
            info!(monitor_id = id, "停止监控循环");
        }
    }

    async fn interval_for(&self, id: i64) -> Result<Duration, sqlx::Error> {
        let settings = settings_service::load_settings(&self.pool, &self.cfg).await?;
        let secs = match monitor_service::get_monitor(&self.pool, id).await? {
            Some(m) => effective_interval_secs(&m, &settings),
            None => settings.check_interval_seconds,
        };
        Ok(Duration::from_secs(secs.max(1) as u64))
    }

    /// Single-flight probe entry point, shared by loops, the supervisor and
    /// manual run-now requests. The probe itself runs in its own task so a
    /// panic in one check can never take the caller down.
    pub async fn check_once(self: Arc<Self>, id: i64) {
        {
            let mut running = self.running.lock().unwrap();
            if !running.insert(id) {
                debug!(monitor_id = id, "跳过并发检查");
                return;
            }
        }
        let engine = Arc::clone(&self);
        let outcome = tokio::spawn(async move { engine.check_monitor(id).await }).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(monitor_id = id, error = %e, "检查执行失败"),
            Err(e) => error!(monitor_id = id, error = %e, "检查任务异常退出"),
        }
        self.running.lock().unwrap().remove(&id);
    }

    /// The full pipeline for one probe: HTTP check, result persistence,
    /// state engine, notification gate, TLS inspection, event publication.
    async fn check_monitor(&self, id: i64) -> Result<(), sqlx::Error> {
        let Some(monitor) = monitor_service::get_monitor(&self.pool, id).await? else {
            return Ok(());
        };
        let settings = settings_service::load_settings(&self.pool, &self.cfg).await?;
        let timeout =
            Duration::from_secs(effective_interval_secs(&monitor, &settings).max(1) as u64);

        let outcome = prober::probe(&monitor, timeout).await;
        let checked_at = Utc::now();
        result_service::record_result(
            &self.pool,
            id,
            checked_at,
            outcome.online,
            outcome.status_code,
            outcome.response_ms,
            outcome.error.as_deref(),
        )
        .await?;
        info!(
            monitor = %monitor.name,
            online = outcome.online,
            status = outcome.status_code.unwrap_or(0),
            elapsed_ms = outcome.response_ms,
            "监控结果"
        );

        let mut st = state_service::load_state(&self.pool, id).await?;
        let params = StateParams {
            flap_threshold: monitor
                .flap_threshold
                .filter(|v| *v > 0)
                .unwrap_or(settings.flap_threshold),
            stabilize_count: settings.stabilize_count,
        };
        let transition = state::apply_probe(&mut st, outcome.online, &params);
        state_service::upsert_state(&self.pool, &st).await?;

        let error_text = outcome.error.clone().unwrap_or_default();
        if let Some(t) = transition {
            let message = gate::status_change_message(
                &monitor.name,
                t.to_online,
                outcome.status_code.unwrap_or(0),
                &error_text,
            );
            self.gate
                .handle_status_change(
                    &monitor,
                    &settings,
                    t.to_online,
                    outcome.status_code,
                    &error_text,
                    &message,
                )
                .await?;
            self.bus.publish(
                Update::probe(
                    id,
                    &monitor.name,
                    checked_at,
                    outcome.online,
                    outcome.status_code,
                    outcome.response_ms,
                    &error_text,
                )
                .with_event(EVENT_STATUS_CHANGE, &message),
            );
        }

        if monitor.url.to_ascii_lowercase().starts_with("https") {
            self.check_ssl(&monitor, &settings).await?;
        }

        self.bus.publish(Update::probe(
            id,
            &monitor.name,
            checked_at,
            outcome.online,
            outcome.status_code,
            outcome.response_ms,
            &error_text,
        ));
        Ok(())
    }

    /// Refreshes the certificate facts and raises an expiry indication when
    /// the lead window is reached. A failed dial leaves the stored facts
    /// untouched.
    async fn check_ssl(&self, monitor: &Monitor, settings: &Settings) -> Result<(), sqlx::Error> {
        let Some(fact) = tls::inspect(&monitor.url).await else {
            return Ok(());
        };
        state_service::upsert_ssl_info(
            &self.pool,
            monitor.id,
            fact.expires_at,
            &fact.issuer,
            fact.days_left,
        )
        .await?;

        if fact.days_left <= settings.alert_before_days {
            let message = gate::ssl_expiry_message(&monitor.name, fact.days_left, fact.expires_at);
            self.gate
                .handle_ssl_expiry(monitor, settings, fact.days_left, fact.expires_at, &message)
                .await?;
            self.bus.publish(
                Update::probe(monitor.id, &monitor.name, Utc::now(), true, None, 0, "")
                    .with_event(EVENT_SSL_EXPIRY, &message),
            );
        }
        Ok(())
    }

    /// Sweeps every https monitor regardless of its probe cadence.
    pub async fn run_ssl_check_all(&self) -> Result<(), sqlx::Error> {
        let monitors = monitor_service::list_monitors(&self.pool).await?;
        let settings = settings_service::load_settings(&self.pool, &self.cfg).await?;
        for m in monitors
            .iter()
            .filter(|m| m.url.to_ascii_lowercase().starts_with("https"))
        {
            self.check_ssl(m, &settings).await?;
        }
        Ok(())
    }

    async fn daily_sweep_loop(self: Arc<Self>) {
        loop {
            let now = Local::now();
            let next = next_daily_run(now);
            let wait = (next - now)
                .to_std()
                .unwrap_or(Duration::from_secs(60));
            tokio::time::sleep(wait).await;

            if let Err(e) = self.run_ssl_check_all().await {
                error!(error = %e, "每日SSL检测失败");
            }
            match settings_service::load_settings(&self.pool, &self.cfg).await {
                Ok(settings) => {
                    match result_service::reap_old_results(&self.pool, settings.retention_days)
                        .await
                    {
                        Ok(removed) => {
                            info!(removed = removed, "每日任务完成：SSL检测与数据清理")
                        }
                        Err(e) => error!(error = %e, "历史数据清理失败"),
                    }
                }
                Err(e) => error!(error = %e, "读取设置失败"),
            }
        }
    }
}

/// Monitor interval when positive, otherwise the settings default.
pub fn effective_interval_secs(monitor: &Monitor, settings: &Settings) -> i32 {
    if monitor.interval_seconds > 0 {
        monitor.interval_seconds
    } else {
        settings.check_interval_seconds
    }
}

/// Delay until the next tick boundary aligned to `interval` relative to the
/// Unix epoch. A timestamp already on the boundary fires immediately.
pub fn grid_delay(now_unix_nanos: i64, interval: Duration) -> Duration {
    let interval_ns = interval.as_nanos() as i64;
    if interval_ns <= 0 {
        return Duration::ZERO;
    }
    let rem = now_unix_nanos.rem_euclid(interval_ns);
    if rem == 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos((interval_ns - rem) as u64)
    }
}

/// The next local 04:00 strictly after `now`.
pub fn next_daily_run(now: DateTime<Local>) -> DateTime<Local> {
    let mut date = now.date_naive();
    for _ in 0..3 {
        if let Some(candidate) = date
            .and_hms_opt(4, 0, 0)
            .and_then(|dt| Local.from_local_datetime(&dt).earliest())
        {
            if candidate > now {
                return candidate;
            }
        }
        date = date.succ_opt().unwrap_or(date);
    }
    now + chrono::Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn monitor_with_interval(secs: i32) -> Monitor {
        Monitor {
            id: 1,
            name: "demo".to_string(),
            url: "https://example.com".to_string(),
            method: "GET".to_string(),
            headers: serde_json::json!({}),
            body: None,
            expected_status_min: 200,
            expected_status_max: 299,
            keyword: None,
            group_id: None,
            interval_seconds: secs,
            flap_threshold: None,
            notify_cooldown_minutes: None,
            last_online: None,
            last_checked_at: None,
        }
    }

    fn settings() -> Settings {
        Settings {
            retention_days: 30,
            flap_threshold: 2,
            check_interval_seconds: 60,
            stabilize_count: 1,
            notify_cooldown_minutes: 0,
            alert_before_days: 14,
            site_name: "服务监控系统".to_string(),
            subtitle: String::new(),
            tab_subtitle: String::new(),
            enable_notifications: true,
            notify_events: vec!["online".into(), "offline".into(), "ssl_expiry".into()],
            smtp_server: String::new(),
            smtp_port: 0,
            smtp_user: String::new(),
            smtp_password: String::new(),
            from_email: String::new(),
            to_emails: String::new(),
        }
    }

    #[test]
    fn zero_interval_falls_back_to_settings_default() {
        assert_eq!(effective_interval_secs(&monitor_with_interval(0), &settings()), 60);
        assert_eq!(effective_interval_secs(&monitor_with_interval(30), &settings()), 30);
    }

    #[test]
    fn grid_delay_aligns_to_the_next_boundary() {
        let interval = Duration::from_secs(60);
        let boundary = 1_700_000_040_000_000_000_i64; // multiple of 60 s
        assert_eq!(boundary % interval.as_nanos() as i64, 0);
        assert_eq!(grid_delay(boundary, interval), Duration::ZERO);

        let twelve_past = boundary + Duration::from_secs(12).as_nanos() as i64;
        assert_eq!(grid_delay(twelve_past, interval), Duration::from_secs(48));
    }

    #[test]
    fn grid_delay_is_never_a_full_interval() {
        let interval = Duration::from_secs(30);
        for offset in [0_i64, 1, 15_000_000_000, 29_999_999_999] {
            let delay = grid_delay(offset, interval);
            assert!(delay < interval);
        }
    }

    #[test]
    fn next_daily_run_lands_on_four_oclock_after_now() {
        let now = Local::now();
        let next = next_daily_run(now);
        assert!(next > now);
        assert_eq!(next.hour(), 4);
        assert_eq!(next.minute(), 0);
        assert!(next - now <= chrono::Duration::hours(24));
    }
}
