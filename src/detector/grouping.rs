use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::types::{Line, Observation};

/// (match, bookmaker, market, line): price/limit comparison within one line.
pub type LineKey = (i64, i64, String, Line);
/// (match, bookmaker, market): line-set comparison.
pub type MarketKey = (i64, i64, String);
/// (match, bookmaker): market-set comparison.
pub type MatchKey = (i64, i64);
/// (match, market, line): the same outcome across bookmakers.
pub type OutcomeKey = (i64, String, Line);

/// Observations sharing one grouping key, ordered by `captured_at` ascending.
/// Never empty.
#[derive(Debug)]
pub struct Partition<'a> {
    rows: Vec<&'a Observation>,
}

impl<'a> Partition<'a> {
    pub fn rows(&self) -> &[&'a Observation] {
        &self.rows
    }

    /// Earliest observation in the window (not the all-time first).
    pub fn before(&self) -> &'a Observation {
        self.rows[0]
    }

    /// Latest observation in the window.
    pub fn after(&self) -> &'a Observation {
        self.rows[self.rows.len() - 1]
    }

    /// True when the window holds at least two distinct capture times, i.e.
    /// there is a strictly earlier "before" to compare against.
    pub fn has_span(&self) -> bool {
        self.before().captured_at < self.after().captured_at
    }

    pub fn span_seconds(&self) -> i64 {
        (self.after().captured_at - self.before().captured_at).num_seconds()
    }

    /// Rows captured within `eps` of the window start (inclusive).
    pub fn start_snapshot(&self, eps: Duration) -> impl Iterator<Item = &'a Observation> + '_ {
        snapshot_at(&self.rows, self.before().captured_at, eps)
    }

    /// Rows captured within `eps` of the window end (inclusive).
    pub fn end_snapshot(&self, eps: Duration) -> impl Iterator<Item = &'a Observation> + '_ {
        snapshot_at(&self.rows, self.after().captured_at, eps)
    }
}

/// Approximates a discrete snapshot over irregular sampling: every row whose
/// capture time is within `eps` of `anchor`, boundary included.
pub fn snapshot_at<'a, 'r>(
    rows: &'r [&'a Observation],
    anchor: DateTime<Utc>,
    eps: Duration,
) -> impl Iterator<Item = &'a Observation> + 'r {
    rows.iter().copied().filter(move |o| {
        let offset = o.captured_at - anchor;
        offset >= -eps && offset <= eps
    })
}

/// Partitions `rows` by `key`. Every row lands in exactly one partition and
/// each partition is sorted by capture time (stable for equal timestamps).
pub fn partition_by<'a, K, F>(rows: &'a [Observation], key: F) -> BTreeMap<K, Partition<'a>>
where
    K: Ord,
    F: Fn(&Observation) -> K,
{
    let mut groups: BTreeMap<K, Vec<&'a Observation>> = BTreeMap::new();
    for row in rows {
        groups.entry(key(row)).or_default().push(row);
    }
    groups
        .into_iter()
        .map(|(k, mut rows)| {
            rows.sort_by_key(|o| o.captured_at);
            (k, Partition { rows })
        })
        .collect()
}

pub fn by_line(rows: &[Observation]) -> BTreeMap<LineKey, Partition<'_>> {
    partition_by(rows, |o| {
        (o.match_id, o.bookmaker_id, o.market_type.clone(), o.line.clone())
    })
}

pub fn by_market(rows: &[Observation]) -> BTreeMap<MarketKey, Partition<'_>> {
    partition_by(rows, |o| (o.match_id, o.bookmaker_id, o.market_type.clone()))
}

pub fn by_match(rows: &[Observation]) -> BTreeMap<MatchKey, Partition<'_>> {
    partition_by(rows, |o| (o.match_id, o.bookmaker_id))
}

pub fn by_outcome(rows: &[Observation]) -> BTreeMap<OutcomeKey, Partition<'_>> {
    partition_by(rows, |o| (o.match_id, o.market_type.clone(), o.line.clone()))
}
