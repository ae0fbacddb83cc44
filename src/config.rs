use std::collections::HashSet;
use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::types::AnomalyType;

pub const DATABASE_URL: &str = "sqlite:odds.db";

/// Trailing analysis window (minutes). Bounds detection latency and sensitivity.
pub const WINDOW_MINUTES: i64 = 30;

/// Price move thresholds: both must be met to flag ODDS_DROP / ODDS_RISE.
pub const ODDS_JUMP_PCT: f64 = 15.0;
pub const ODDS_JUMP_ABS: f64 = 0.15;

/// Limit cut thresholds: either one flags LIMIT_CUT.
pub const LIMIT_CUT_PCT: f64 = 40.0;
pub const LIMIT_CUT_ABS: f64 = 50.0;

/// A bookmaker with no observation for longer than this is reported as down.
pub const OUTAGE_MINUTES: i64 = 20;

/// Rows within this many seconds of the window's first/last timestamp form
/// the start/end snapshot. Inclusive on both sides.
pub const SNAPSHOT_EPS_SECONDS: i64 = 60;

/// Scheduler tick (seconds).
pub const SLEEP_SECONDS: u64 = 60;

/// An identical anomaly recorded within this span is not recorded again.
pub const SUPPRESSION_MINUTES: i64 = 60;

pub const DIVERGENCE_PCT: f64 = 12.0;

/// Prices at or below this are ignored by the divergence rule (near-certain outcomes).
pub const DIVERGENCE_MIN_ODD: f64 = 1.01;

/// An outcome priced at or below this is treated as blocked.
pub const BLOCK_ODD_THRESHOLD: f64 = 1.02;

/// Busy timeout applied to every per-pass store connection (seconds).
pub const STORE_TIMEOUT_SECS: u64 = 10;

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Outbound alert request timeout (seconds).
pub const NOTIFY_TIMEOUT_SECS: u64 = 5;

pub const DEFAULT_NOTIFY_TYPES: &[AnomalyType] = &[
    AnomalyType::OddsDrop,
    AnomalyType::OddsRise,
    AnomalyType::LimitCut,
    AnomalyType::BetBlocked,
    AnomalyType::BookmakerOutage,
];

/// Everything the rule evaluators need. Passed explicitly so every rule is a
/// pure function of its input rows and these values.
#[derive(Debug, Clone)]
pub struct Thresholds {
    pub window_minutes: i64,
    pub odds_jump_pct: f64,
    pub odds_jump_abs: f64,
    pub limit_cut_pct: f64,
    pub limit_cut_abs: f64,
    pub outage_minutes: i64,
    pub snapshot_eps_seconds: i64,
    pub divergence_enabled: bool,
    pub divergence_pct: f64,
    pub divergence_min_odd: f64,
    pub block_odd_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            window_minutes: WINDOW_MINUTES,
            odds_jump_pct: ODDS_JUMP_PCT,
            odds_jump_abs: ODDS_JUMP_ABS,
            limit_cut_pct: LIMIT_CUT_PCT,
            limit_cut_abs: LIMIT_CUT_ABS,
            outage_minutes: OUTAGE_MINUTES,
            snapshot_eps_seconds: SNAPSHOT_EPS_SECONDS,
            divergence_enabled: true,
            divergence_pct: DIVERGENCE_PCT,
            divergence_min_odd: DIVERGENCE_MIN_ODD,
            block_odd_threshold: BLOCK_ODD_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_url: String,
    pub token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub log_level: String,
    pub thresholds: Thresholds,
    /// Scheduler tick (ANOMALY_SLEEP_SECONDS)
    pub sleep_seconds: u64,
    /// Dedup lookback (SUPPRESSION_MINUTES)
    pub suppression_minutes: i64,
    /// Busy timeout for the per-pass connection (STORE_TIMEOUT_SECS)
    pub store_timeout_secs: u64,
    /// Apply ./migrations at startup (RUN_MIGRATIONS)
    pub run_migrations: bool,
    /// Present only when both TG_TOKEN and TG_CHAT_ID are set.
    pub telegram: Option<TelegramConfig>,
    /// Anomaly types forwarded to the notifier (NOTIFY_TYPES, comma-separated).
    pub notify_types: HashSet<AnomalyType>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DATABASE_URL.to_string(),
            log_level: "info".to_string(),
            thresholds: Thresholds::default(),
            sleep_seconds: SLEEP_SECONDS,
            suppression_minutes: SUPPRESSION_MINUTES,
            store_timeout_secs: STORE_TIMEOUT_SECS,
            run_migrations: true,
            telegram: None,
            notify_types: DEFAULT_NOTIFY_TYPES.iter().copied().collect(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Thresholds::default();
        let thresholds = Thresholds {
            window_minutes: env_parse("ANOMALY_WINDOW_MINUTES", defaults.window_minutes)?,
            odds_jump_pct: env_parse("ODDS_JUMP_PCT", defaults.odds_jump_pct)?,
            odds_jump_abs: env_parse("ODDS_JUMP_ABS", defaults.odds_jump_abs)?,
            limit_cut_pct: env_parse("LIMIT_CUT_PCT", defaults.limit_cut_pct)?,
            limit_cut_abs: env_parse("LIMIT_CUT_ABS", defaults.limit_cut_abs)?,
            outage_minutes: env_parse("BOOKMAKER_OUTAGE_MINUTES", defaults.outage_minutes)?,
            snapshot_eps_seconds: env_parse("SNAPSHOT_EPS_SECONDS", defaults.snapshot_eps_seconds)?,
            divergence_enabled: env_parse("DIVERGENCE_ENABLED", defaults.divergence_enabled)?,
            divergence_pct: env_parse("DIVERGENCE_PCT", defaults.divergence_pct)?,
            divergence_min_odd: env_parse("DIVERGENCE_MIN_ODD", defaults.divergence_min_odd)?,
            block_odd_threshold: env_parse("BLOCK_ODD_THRESHOLD", defaults.block_odd_threshold)?,
        };

        let telegram = match (non_empty_var("TG_TOKEN"), non_empty_var("TG_CHAT_ID")) {
            (Some(token), Some(chat_id)) => Some(TelegramConfig {
                api_url: std::env::var("TG_API_URL")
                    .unwrap_or_else(|_| TELEGRAM_API_URL.to_string()),
                token,
                chat_id,
            }),
            _ => None,
        };

        let notify_types = match non_empty_var("NOTIFY_TYPES") {
            Some(raw) => parse_notify_types(&raw)?,
            None => DEFAULT_NOTIFY_TYPES.iter().copied().collect(),
        };

        let cfg = Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DATABASE_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            thresholds,
            sleep_seconds: env_parse("ANOMALY_SLEEP_SECONDS", SLEEP_SECONDS)?,
            suppression_minutes: env_parse("SUPPRESSION_MINUTES", SUPPRESSION_MINUTES)?,
            store_timeout_secs: env_parse("STORE_TIMEOUT_SECS", STORE_TIMEOUT_SECS)?,
            run_migrations: env_parse("RUN_MIGRATIONS", true)?,
            telegram,
            notify_types,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values that would make every rule silent or every pass spin.
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        let positive = [
            ("ANOMALY_WINDOW_MINUTES", t.window_minutes as f64),
            ("ODDS_JUMP_PCT", t.odds_jump_pct),
            ("LIMIT_CUT_PCT", t.limit_cut_pct),
            ("BOOKMAKER_OUTAGE_MINUTES", t.outage_minutes as f64),
            ("DIVERGENCE_PCT", t.divergence_pct),
            ("ANOMALY_SLEEP_SECONDS", self.sleep_seconds as f64),
            ("SUPPRESSION_MINUTES", self.suppression_minutes as f64),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(AppError::Config(format!("{name} must be positive")));
            }
        }
        let non_negative = [
            ("ODDS_JUMP_ABS", t.odds_jump_abs),
            ("LIMIT_CUT_ABS", t.limit_cut_abs),
            ("SNAPSHOT_EPS_SECONDS", t.snapshot_eps_seconds as f64),
            ("DIVERGENCE_MIN_ODD", t.divergence_min_odd),
            ("BLOCK_ODD_THRESHOLD", t.block_odd_threshold),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(AppError::Config(format!("{name} must not be negative")));
            }
        }
        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match non_empty_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw:?}"))),
        None => Ok(default),
    }
}

pub fn parse_notify_types(raw: &str) -> Result<HashSet<AnomalyType>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<AnomalyType>()
                .map_err(|_| AppError::Config(format!("NOTIFY_TYPES: unknown anomaly type {s:?}")))
        })
        .collect()
}
