pub mod dedup;
pub mod models;
pub mod reader;
pub mod writer;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, SqliteConnection};

use crate::error::{AppError, Result};

/// Opens a dedicated connection. Every store call on it is bounded by
/// `timeout_secs` of lock waiting.
pub async fn connect(url: &str, timeout_secs: u64, create_if_missing: bool) -> Result<SqliteConnection> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(AppError::StoreUnavailable)?
        .busy_timeout(Duration::from_secs(timeout_secs))
        .create_if_missing(create_if_missing);
    options.connect().await.map_err(AppError::StoreUnavailable)
}

pub async fn migrate(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::migrate!("./migrations").run(conn).await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::testing::{anomaly_count, insert_odds, memory_db};
    use super::*;
    use crate::db::reader::{fetch_last_seen, fetch_window};
    use crate::db::writer::{AnomalyWriter, WriteOutcome};
    use crate::detector::grouping::fixtures::t0;
    use crate::types::{AnomalyCandidate, AnomalyType, Line};

    #[tokio::test]
    async fn window_read_skips_malformed_rows() {
        let mut conn = memory_db().await;
        insert_odds(&mut conn, 1, 1, "TOTAL", "2.5", 1.9, Some(300.0), t0()).await;
        insert_odds(&mut conn, 1, 1, "1X2", "home", 2.4, None, t0()).await;
        // outside the window
        insert_odds(&mut conn, 1, 1, "TOTAL", "2.5", 1.8, None, t0() - Duration::hours(2)).await;
        // unparseable price and timestamp
        sqlx::query(
            "INSERT INTO odds_history (match_id, bookmaker_id, market_type, line, odd, captured_at)
             VALUES (1, 1, 'TOTAL', '3.5', 'n/a', '2024-05-01 12:00:00'),
                    (1, 1, 'TOTAL', '3.5', 1.7, 'not a time')",
        )
        .execute(&mut conn)
        .await
        .unwrap();

        let batch = fetch_window(&mut conn, t0() - Duration::minutes(30)).await.unwrap();
        assert_eq!(batch.observations.len(), 2);
        assert_eq!(batch.skipped, 2);

        let total = batch.observations.iter().find(|o| o.market_type == "TOTAL").unwrap();
        assert_eq!(total.line, Line::Numeric(2.5));
        assert_eq!(total.limit_value, Some(300.0));
        let winner = batch.observations.iter().find(|o| o.market_type == "1X2").unwrap();
        assert_eq!(winner.line, Line::Named("home".to_string()));
        assert_eq!(winner.limit_value, None);
    }

    #[tokio::test]
    async fn last_seen_is_unwindowed() {
        let mut conn = memory_db().await;
        insert_odds(&mut conn, 1, 1, "1X2", "1", 2.0, None, t0() - Duration::days(3)).await;
        insert_odds(&mut conn, 1, 1, "1X2", "1", 2.0, None, t0() - Duration::days(2)).await;
        insert_odds(&mut conn, 1, 2, "1X2", "1", 2.0, None, t0()).await;

        let mut seen = fetch_last_seen(&mut conn).await.unwrap();
        seen.sort_by_key(|hb| hb.bookmaker_id);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].last_seen, t0() - Duration::days(2));
        assert_eq!(seen[1].last_seen, t0());
    }

    #[tokio::test]
    async fn malformed_timestamp_does_not_hide_last_seen() {
        let mut conn = memory_db().await;
        insert_odds(&mut conn, 1, 4, "1X2", "1", 2.0, None, t0() - Duration::minutes(45)).await;
        sqlx::query(
            "INSERT INTO odds_history (match_id, bookmaker_id, market_type, line, odd, captured_at)
             VALUES (1, 4, '1X2', '1', 2.0, 'garbage'),
                    (1, 5, '1X2', '1', 2.0, 'garbage')",
        )
        .execute(&mut conn)
        .await
        .unwrap();

        let seen = fetch_last_seen(&mut conn).await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].bookmaker_id, 4);
        assert_eq!(seen[0].last_seen, t0() - Duration::minutes(45));
    }

    #[tokio::test]
    async fn window_start_is_inclusive_for_whole_second_rows() {
        let mut conn = memory_db().await;
        sqlx::query(
            "INSERT INTO odds_history (match_id, bookmaker_id, market_type, line, odd, captured_at)
             VALUES (1, 1, '1X2', '1', 2.0, '2024-05-01 11:30:00'),
                    (1, 1, '1X2', '2', 3.0, '2024-05-01 11:29:59.999')",
        )
        .execute(&mut conn)
        .await
        .unwrap();

        let batch = fetch_window(&mut conn, t0() - Duration::minutes(30)).await.unwrap();
        assert_eq!(batch.observations.len(), 1);
        assert_eq!(batch.observations[0].line, Line::Numeric(1.0));
        assert_eq!(batch.skipped, 0);
    }

    #[tokio::test]
    async fn identical_candidate_is_suppressed_within_window() {
        let mut conn = memory_db().await;
        let writer = AnomalyWriter::new(60);
        let candidate = AnomalyCandidate::new(9, Some(3), AnomalyType::LimitCut, "x".to_string());

        let first = writer.record(&mut conn, candidate.clone(), t0()).await.unwrap();
        assert!(matches!(first, WriteOutcome::Inserted(_)));
        let again = writer
            .record(&mut conn, candidate.clone(), t0() + Duration::minutes(59))
            .await
            .unwrap();
        assert!(matches!(again, WriteOutcome::Suppressed));
        assert_eq!(anomaly_count(&mut conn).await, 1);

        // once the suppression window has passed it is recorded again
        let later = writer
            .record(&mut conn, candidate, t0() + Duration::minutes(61))
            .await
            .unwrap();
        assert!(matches!(later, WriteOutcome::Inserted(_)));
        assert_eq!(anomaly_count(&mut conn).await, 2);
    }

    #[tokio::test]
    async fn dedup_key_distinguishes_null_bookmaker() {
        let mut conn = memory_db().await;
        let writer = AnomalyWriter::new(60);
        let with_book = AnomalyCandidate::new(9, Some(3), AnomalyType::MatchRemoved, "gone".to_string());
        let match_wide = AnomalyCandidate::new(9, None, AnomalyType::MatchRemoved, "gone".to_string());

        writer.record(&mut conn, with_book, t0()).await.unwrap();
        let out = writer.record(&mut conn, match_wide.clone(), t0()).await.unwrap();
        assert!(matches!(out, WriteOutcome::Inserted(_)));
        let out = writer.record(&mut conn, match_wide, t0()).await.unwrap();
        assert!(matches!(out, WriteOutcome::Suppressed));
    }

    #[tokio::test]
    async fn inserted_record_keeps_candidate_fields() {
        let mut conn = memory_db().await;
        let mut candidate = AnomalyCandidate::new(9, Some(3), AnomalyType::OddsDrop, "c".to_string());
        candidate.before_odd = Some(2.0);
        candidate.after_odd = Some(1.6);
        candidate.diff_pct = Some(-20.0);
        candidate.window_seconds = Some(900);
        candidate.is_live = true;

        let WriteOutcome::Inserted(record) =
            AnomalyWriter::new(60).record(&mut conn, candidate, t0()).await.unwrap()
        else {
            panic!("expected insert");
        };

        let row: (String, String, Option<f64>, Option<f64>, Option<i64>, i64, String) = sqlx::query_as(
            "SELECT id, anomaly_type, before_odd, diff_pct, window_seconds, is_live, occurred_at FROM anomalies",
        )
        .fetch_one(&mut conn)
        .await
        .unwrap();
        assert_eq!(row.0, record.id);
        assert_eq!(row.1, "ODDS_DROP");
        assert_eq!(row.2, Some(2.0));
        assert_eq!(row.3, Some(-20.0));
        assert_eq!(row.4, Some(900));
        assert_eq!(row.5, 1);
        assert_eq!(row.6, "2024-05-01 12:00:00.000");
    }
}
