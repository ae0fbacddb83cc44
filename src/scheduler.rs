use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::Connection;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db;
use crate::error::{AppError, Result};
use crate::notifier::TelegramNotifier;
use crate::pipeline::{run_pass, PassReport};

/// Runs the detection pass on a fixed interval, one pass at a time.
///
/// Every pass gets its own connection, opened at the start and closed at the
/// end. Nothing else carries over between passes; suppression state lives in
/// the store.
pub struct Scheduler {
    cfg: Arc<Config>,
    notifier: Option<Arc<TelegramNotifier>>,
}

impl Scheduler {
    pub fn new(cfg: Config, notifier: Option<TelegramNotifier>) -> Self {
        Self {
            cfg: Arc::new(cfg),
            notifier: notifier.map(Arc::new),
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(Duration::from_secs(self.cfg.sleep_seconds));
        // a slow pass pushes the schedule back instead of bunching up ticks
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            every_secs = self.cfg.sleep_seconds,
            window_minutes = self.cfg.thresholds.window_minutes,
            "[SCHEDULER] started"
        );

        loop {
            ticker.tick().await;
            match self.tick().await {
                Ok(report) if report.failed > 0 => {
                    warn!("[SCHEDULER] pass finished with {} failed inserts", report.failed);
                }
                Ok(_) => {}
                Err(e) => error!("[SCHEDULER] pass failed, retrying next tick: {e}"),
            }
        }
    }

    /// One isolated pass. The pass body runs in its own task, so a panic is
    /// reported like any other error and the loop keeps going.
    pub async fn tick(&self) -> Result<PassReport> {
        let cfg = Arc::clone(&self.cfg);
        let notifier = self.notifier.clone();

        let handle = tokio::spawn(async move {
            let mut conn = db::connect(&cfg.database_url, cfg.store_timeout_secs, false).await?;
            let result = run_pass(&mut conn, &cfg, notifier.as_deref(), Utc::now()).await;
            if let Err(e) = conn.close().await {
                warn!("[SCHEDULER] closing connection: {e}");
            }
            result
        });

        match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(AppError::PassAborted(join_err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_config(dir: &std::path::Path) -> Config {
        Config {
            database_url: format!("sqlite:{}", dir.join("odds.db").display()),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn unreachable_store_fails_the_tick_only() {
        let dir = tempfile::tempdir().unwrap();
        // file does not exist and the pass never creates it
        let scheduler = Scheduler::new(file_config(dir.path()), None);

        let err = scheduler.tick().await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
        // the scheduler is still usable for the next tick
        assert!(scheduler.tick().await.is_err());
    }

    #[tokio::test]
    async fn tick_opens_a_fresh_connection_per_pass() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = file_config(dir.path());
        let mut setup = db::connect(&cfg.database_url, 5, true).await.unwrap();
        db::migrate(&mut setup).await.unwrap();
        setup.close().await.unwrap();

        let scheduler = Scheduler::new(cfg, None);
        let first = scheduler.tick().await.unwrap();
        let second = scheduler.tick().await.unwrap();
        assert_eq!(first, PassReport::default());
        assert_eq!(second, PassReport::default());
    }
}
