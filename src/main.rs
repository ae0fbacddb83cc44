mod config;
mod db;
mod detector;
mod error;
mod notifier;
mod pipeline;
mod scheduler;
mod types;

use sqlx::Connection;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Result;
use crate::notifier::TelegramNotifier;
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Schema ---
    if cfg.run_migrations {
        let mut conn = db::connect(&cfg.database_url, cfg.store_timeout_secs, true).await?;
        db::migrate(&mut conn).await?;
        if let Err(e) = conn.close().await {
            warn!("closing migration connection: {e}");
        }
        info!("Database schema ready at {}", cfg.database_url);
    }

    let t = &cfg.thresholds;
    info!(
        "Detector config: window={}m odds={}%/{} limit={}%/{} outage={}m eps={}s suppress={}m divergence={}",
        t.window_minutes,
        t.odds_jump_pct,
        t.odds_jump_abs,
        t.limit_cut_pct,
        t.limit_cut_abs,
        t.outage_minutes,
        t.snapshot_eps_seconds,
        cfg.suppression_minutes,
        if t.divergence_enabled { format!("{}%", t.divergence_pct) } else { "off".to_string() },
    );

    // --- Notifier ---
    let notifier = TelegramNotifier::from_config(&cfg)?;
    if notifier.is_none() {
        info!("TG_TOKEN / TG_CHAT_ID not set, alerts are recorded but not pushed");
    }

    Scheduler::new(cfg, notifier).run().await;
    Ok(())
}
