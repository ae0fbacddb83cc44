use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::reader::{fetch_last_seen, fetch_window};
use crate::db::writer::{AnomalyWriter, WriteOutcome};
use crate::detector::{evaluate_window, outage};
use crate::error::Result;
use crate::notifier::TelegramNotifier;
use crate::types::{AnomalyCandidate, AnomalyRecord};

/// Counters for one detection pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub observations: usize,
    pub skipped_rows: usize,
    pub candidates: usize,
    pub inserted: usize,
    pub suppressed: usize,
    pub failed: usize,
}

/// One full detection pass against an open connection:
/// read window → group → rules → dedup → write → notify, then the same for
/// the outage scan.
///
/// Only a failed read aborts the pass. Candidate-level failures are logged
/// and counted, and the remaining candidates are still processed.
pub async fn run_pass(
    conn: &mut SqliteConnection,
    cfg: &Config,
    notifier: Option<&TelegramNotifier>,
    now: DateTime<Utc>,
) -> Result<PassReport> {
    let writer = AnomalyWriter::new(cfg.suppression_minutes);
    let mut report = PassReport::default();

    let since = now - Duration::minutes(cfg.thresholds.window_minutes);
    let batch = fetch_window(conn, since).await?;
    report.observations = batch.observations.len();
    report.skipped_rows = batch.skipped;

    if batch.observations.is_empty() {
        info!("[PASS] no observations in the last {} min", cfg.thresholds.window_minutes);
    }
    let windowed = evaluate_window(&batch.observations, &cfg.thresholds);
    let recorded = write_all(conn, &writer, windowed, now, &mut report).await;
    // Windowed alerts are sent before the outage read, which may still fail the pass.
    notify_all(notifier, &recorded).await;

    let heartbeats = fetch_last_seen(conn).await?;
    let outages = outage::outages(&heartbeats, now, &cfg.thresholds);
    let recorded = write_all(conn, &writer, outages, now, &mut report).await;
    notify_all(notifier, &recorded).await;

    info!(
        observations = report.observations,
        skipped = report.skipped_rows,
        candidates = report.candidates,
        inserted = report.inserted,
        suppressed = report.suppressed,
        failed = report.failed,
        "[PASS] done | obs={} candidates={} new={} suppressed={} failed={}",
        report.observations, report.candidates, report.inserted, report.suppressed, report.failed,
    );
    Ok(report)
}

/// Gate and insert each candidate in order, returning the inserted records.
/// Never short-circuits: one bad insert does not cost the rest of the batch.
async fn write_all(
    conn: &mut SqliteConnection,
    writer: &AnomalyWriter,
    candidates: Vec<AnomalyCandidate>,
    now: DateTime<Utc>,
    report: &mut PassReport,
) -> Vec<AnomalyRecord> {
    report.candidates += candidates.len();
    let mut recorded = Vec::new();

    for candidate in candidates {
        let label = format!("{} match={}", candidate.anomaly_type, candidate.match_id);
        match writer.record(conn, candidate, now).await {
            Ok(WriteOutcome::Inserted(record)) => {
                report.inserted += 1;
                recorded.push(record);
            }
            Ok(WriteOutcome::Suppressed) => report.suppressed += 1,
            Err(e) => {
                report.failed += 1;
                warn!("[PASS] dropped candidate {label}: {e}");
            }
        }
    }
    recorded
}

async fn notify_all(notifier: Option<&TelegramNotifier>, recorded: &[AnomalyRecord]) {
    let Some(notifier) = notifier else {
        return;
    };
    for record in recorded {
        notifier.notify(record).await;
    }
}
