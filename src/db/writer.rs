use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::dedup;
use crate::db::models::format_ts;
use crate::error::{AppError, Result};
use crate::types::{AnomalyCandidate, AnomalyRecord};

#[derive(Debug)]
pub enum WriteOutcome {
    Inserted(AnomalyRecord),
    /// An identical anomaly is already on record inside the suppression window.
    Suppressed,
}

/// Persists accepted candidates to `anomalies`. Append-only: rows are never
/// updated or deleted here.
pub struct AnomalyWriter {
    suppression: Duration,
}

impl AnomalyWriter {
    pub fn new(suppression_minutes: i64) -> Self {
        Self { suppression: Duration::minutes(suppression_minutes) }
    }

    /// Dedup check immediately followed by the insert, on the same connection.
    /// Callers must not batch the checks: a duplicate produced later in the
    /// same pass is only caught because the earlier insert is already visible.
    pub async fn record(
        &self,
        conn: &mut SqliteConnection,
        candidate: AnomalyCandidate,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        if dedup::recently_recorded(conn, &candidate, now - self.suppression).await? {
            debug!(
                match_id = candidate.match_id,
                anomaly_type = %candidate.anomaly_type,
                "[WRITER] suppressed duplicate: {}",
                candidate.comment,
            );
            return Ok(WriteOutcome::Suppressed);
        }

        let record = AnomalyRecord {
            id: Uuid::new_v4().to_string(),
            occurred_at: now,
            candidate,
        };
        self.write_anomaly(conn, &record).await?;

        let c = &record.candidate;
        info!(
            event = "ANOMALY",
            id = %record.id,
            match_id = c.match_id,
            bookmaker_id = ?c.bookmaker_id,
            anomaly_type = %c.anomaly_type,
            "ANOMALY | {} | match={} book={} | {}",
            c.anomaly_type,
            c.match_id,
            c.bookmaker_id.map(|b| b.to_string()).unwrap_or_else(|| "-".to_string()),
            c.comment,
        );
        Ok(WriteOutcome::Inserted(record))
    }

    async fn write_anomaly(&self, conn: &mut SqliteConnection, r: &AnomalyRecord) -> Result<()> {
        let c = &r.candidate;

        sqlx::query(
            r#"
            INSERT INTO anomalies (
                id, match_id, bookmaker_id, anomaly_type,
                before_odd, after_odd, before_limit, after_limit,
                diff_pct, window_seconds, is_live, comment, occurred_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&r.id)
        .bind(c.match_id)
        .bind(c.bookmaker_id)
        .bind(c.anomaly_type.as_str())
        .bind(c.before_odd)
        .bind(c.after_odd)
        .bind(c.before_limit)
        .bind(c.after_limit)
        .bind(c.diff_pct)
        .bind(c.window_seconds)
        .bind(i64::from(c.is_live))
        .bind(&c.comment)
        .bind(format_ts(r.occurred_at))
        .execute(&mut *conn)
        .await
        .map_err(AppError::InsertFailure)?;

        Ok(())
    }
}
