//! Store-boundary decoding. `odds_history` is written by an external
//! collector and its columns are loosely typed in practice (numbers stored
//! as text, missing limits, mixed timestamp formats). Every row is turned into
//! a strictly typed [`Observation`] here or rejected with `RowShape`.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, TypeInfo, ValueRef};

use crate::error::{AppError, Result};
use crate::types::{BookmakerHeartbeat, Line, Observation};

/// Canonical timestamp text. Sorts lexicographically in time order and shares
/// its prefix with SQLite's `CURRENT_TIMESTAMP`.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// Accepts the canonical format (with or without fractional seconds), a `T`
/// separator, or full RFC 3339. Naive values are taken as UTC.
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// A column value as SQLite actually stored it.
#[derive(Debug, Clone, PartialEq)]
enum Raw {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

fn raw(row: &SqliteRow, column: &'static str) -> Result<Raw> {
    let value = row
        .try_get_raw(column)
        .map_err(|e| AppError::row_shape(column, e.to_string()))?;
    if value.is_null() {
        return Ok(Raw::Null);
    }
    let type_name = value.type_info().name().to_string();

    let decoded = match type_name.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => {
            row.try_get_unchecked::<i64, _>(column).map(Raw::Int)
        }
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            row.try_get_unchecked::<f64, _>(column).map(Raw::Real)
        }
        "BLOB" => return Err(AppError::row_shape(column, "unexpected blob")),
        _ => row.try_get_unchecked::<String, _>(column).map(Raw::Text),
    };
    decoded.map_err(|e| AppError::row_shape(column, e.to_string()))
}

fn required_id(row: &SqliteRow, column: &'static str) -> Result<i64> {
    let id = match raw(row, column)? {
        Raw::Int(v) => v,
        Raw::Real(v) if v.fract() == 0.0 => v as i64,
        Raw::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| AppError::row_shape(column, format!("not an id: {s:?}")))?,
        Raw::Null => return Err(AppError::row_shape(column, "missing")),
        Raw::Real(v) => return Err(AppError::row_shape(column, format!("not an id: {v}"))),
    };
    if id <= 0 {
        return Err(AppError::row_shape(column, format!("non-positive id {id}")));
    }
    Ok(id)
}

fn optional_number(row: &SqliteRow, column: &'static str) -> Result<Option<f64>> {
    let value = match raw(row, column)? {
        Raw::Null => return Ok(None),
        Raw::Int(v) => v as f64,
        Raw::Real(v) => v,
        Raw::Text(s) if s.trim().is_empty() => return Ok(None),
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| AppError::row_shape(column, format!("not a number: {s:?}")))?,
    };
    if !value.is_finite() {
        return Err(AppError::row_shape(column, format!("not finite: {value}")));
    }
    Ok(Some(value))
}

fn required_text(row: &SqliteRow, column: &'static str) -> Result<String> {
    let text = match raw(row, column)? {
        Raw::Text(s) => s.trim().to_string(),
        Raw::Int(v) => v.to_string(),
        Raw::Real(v) => v.to_string(),
        Raw::Null => String::new(),
    };
    if text.is_empty() {
        return Err(AppError::row_shape(column, "missing"));
    }
    Ok(text)
}

fn required_ts(row: &SqliteRow, column: &'static str) -> Result<DateTime<Utc>> {
    match raw(row, column)? {
        Raw::Text(s) => {
            parse_ts(&s).ok_or_else(|| AppError::row_shape(column, format!("bad timestamp {s:?}")))
        }
        Raw::Null => Err(AppError::row_shape(column, "missing")),
        other => Err(AppError::row_shape(column, format!("bad timestamp {other:?}"))),
    }
}

fn flag(row: &SqliteRow, column: &'static str) -> Result<bool> {
    Ok(match raw(row, column)? {
        Raw::Null => false,
        Raw::Int(v) => v != 0,
        Raw::Real(v) => v != 0.0,
        Raw::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
    })
}

/// Decodes one `odds_history` row. `odd` is required; `limit_value` may be
/// absent. Non-positive prices are kept: the rules decide what they mean.
pub fn observation_from_row(row: &SqliteRow) -> Result<Observation> {
    let line_text = required_text(row, "line")?;
    let line = Line::parse(&line_text)
        .ok_or_else(|| AppError::row_shape("line", format!("unusable line {line_text:?}")))?;

    Ok(Observation {
        match_id: required_id(row, "match_id")?,
        bookmaker_id: required_id(row, "bookmaker_id")?,
        market_type: required_text(row, "market_type")?,
        line,
        odd: optional_number(row, "odd")?.ok_or_else(|| AppError::row_shape("odd", "missing"))?,
        limit_value: optional_number(row, "limit_value")?,
        captured_at: required_ts(row, "captured_at")?,
        is_live: flag(row, "is_live")?,
    })
}

pub fn heartbeat_from_row(row: &SqliteRow) -> Result<BookmakerHeartbeat> {
    Ok(BookmakerHeartbeat {
        bookmaker_id: required_id(row, "bookmaker_id")?,
        last_seen: required_ts(row, "last_seen")?,
    })
}
