use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db::models::format_ts;
use crate::error::{AppError, Result};
use crate::types::AnomalyCandidate;

// `IS` is SQLite's null-safe equality, so match-wide events (no bookmaker)
// only match other match-wide events.
const EXISTS_QUERY: &str = r#"
    SELECT EXISTS (
        SELECT 1 FROM anomalies
        WHERE match_id = ?
          AND bookmaker_id IS ?
          AND anomaly_type = ?
          AND comment = ?
          AND occurred_at >= ?
    )
"#;

/// True if an anomaly with the same match, bookmaker, type and comment was
/// recorded at or after `since`. Always asks the store; nothing is cached, so
/// suppression survives restarts and sees rows inserted earlier in this pass.
pub async fn recently_recorded(
    conn: &mut SqliteConnection,
    candidate: &AnomalyCandidate,
    since: DateTime<Utc>,
) -> Result<bool> {
    let exists: i64 = sqlx::query_scalar(EXISTS_QUERY)
        .bind(candidate.match_id)
        .bind(candidate.bookmaker_id)
        .bind(candidate.anomaly_type.as_str())
        .bind(&candidate.comment)
        .bind(format_ts(since))
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::StoreUnavailable)?;
    Ok(exists != 0)
}
