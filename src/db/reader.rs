use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use crate::db::models::{heartbeat_from_row, observation_from_row};
use crate::error::{AppError, Result};
use crate::types::{BookmakerHeartbeat, Observation};

const WINDOW_QUERY: &str = r#"
    SELECT match_id, bookmaker_id, market_type, line, odd, limit_value, captured_at, is_live
    FROM odds_history
    WHERE captured_at >= ?
    ORDER BY captured_at
"#;

// Ranked by julianday() so one unparseable captured_at cannot outrank real
// dates; SQLite returns the bare `captured_at` of the row holding the MAX.
const LAST_SEEN_QUERY: &str = r#"
    SELECT bookmaker_id, captured_at AS last_seen, MAX(julianday(captured_at)) AS ranked
    FROM odds_history
    WHERE captured_at GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]*'
      AND julianday(captured_at) IS NOT NULL
    GROUP BY bookmaker_id
"#;

/// Whole seconds only: `"… 11:30:00"` must not sort below a bound of
/// `"… 11:30:00.000"`. The parsed-time filter trims the sub-second excess.
const WINDOW_BOUND_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Observations inside the trailing window, plus how many rows were rejected.
#[derive(Debug, Default)]
pub struct WindowBatch {
    pub observations: Vec<Observation>,
    pub skipped: usize,
}

/// Every observation captured at or after `since`. Malformed rows are skipped
/// individually; only a failed query fails the call.
pub async fn fetch_window(conn: &mut SqliteConnection, since: DateTime<Utc>) -> Result<WindowBatch> {
    let rows = sqlx::query(WINDOW_QUERY)
        .bind(since.format(WINDOW_BOUND_FORMAT).to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(AppError::StoreUnavailable)?;

    let mut batch = WindowBatch::default();
    for row in &rows {
        match observation_from_row(row) {
            // Text comparison can let through rows written in a foreign format;
            // the parsed time is authoritative.
            Ok(o) if o.captured_at < since => {}
            Ok(o) => batch.observations.push(o),
            Err(e) => {
                batch.skipped += 1;
                debug!("[READER] skipping row: {e}");
            }
        }
    }

    if batch.skipped > 0 {
        warn!(
            skipped = batch.skipped,
            total = rows.len(),
            "[READER] {} of {} odds_history rows were malformed and skipped",
            batch.skipped,
            rows.len(),
        );
    }
    Ok(batch)
}

/// Each bookmaker's most recent capture over the whole history.
pub async fn fetch_last_seen(conn: &mut SqliteConnection) -> Result<Vec<BookmakerHeartbeat>> {
    let rows = sqlx::query(LAST_SEEN_QUERY)
        .fetch_all(&mut *conn)
        .await
        .map_err(AppError::StoreUnavailable)?;

    Ok(rows
        .iter()
        .filter_map(|row| match heartbeat_from_row(row) {
            Ok(hb) => Some(hb),
            Err(e) => {
                warn!("[READER] unusable last-seen row: {e}");
                None
            }
        })
        .collect())
}
