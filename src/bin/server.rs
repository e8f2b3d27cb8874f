use std::sync::Arc;

use sitewatch::config::Config;
use sitewatch::db;
use sitewatch::ids::IdGenerator;
use sitewatch::monitoring::events::EventBus;
use sitewatch::monitoring::MonitorEngine;
use sitewatch::notifications::{Mailer, Templates};
use sitewatch::web::{self, AppState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sitewatch=info".parse()?),
        )
        .init();

    let cfg = Config::load();
    info!(addr = %cfg.addr, "正在启动");

    let pool = db::connect(&cfg.database_url).await?;
    db::migrate(&pool).await?;
    info!("数据库初始化完成");

    let bus = EventBus::new();
    let templates = Arc::new(Templates::new());
    let mailer = Mailer::new(cfg.resend_api_key.clone());

    let engine = MonitorEngine::new(
        pool.clone(),
        cfg.clone(),
        bus.clone(),
        mailer.clone(),
        templates.clone(),
    );
    engine.clone().start();

    let state = Arc::new(AppState {
        pool,
        cfg,
        engine,
        bus,
        templates,
        mailer,
        ids: IdGenerator::new(),
    });

    web::run_http_server(state).await
}
