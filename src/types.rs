use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// One captured odds/limit reading, validated at the store boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub match_id: i64,
    pub bookmaker_id: i64,
    pub market_type: String,
    pub line: Line,
    pub odd: f64,
    /// `None` when the bookmaker publishes no limit for this line.
    pub limit_value: Option<f64>,
    pub captured_at: DateTime<Utc>,
    pub is_live: bool,
}

/// Handicap/total line or a named outcome within a market.
///
/// Numeric lines order by value and sort before named outcomes.
/// `-0.0` and `0.0` are the same line.
#[derive(Debug, Clone)]
pub enum Line {
    Numeric(f64),
    Named(String),
}

impl Line {
    pub fn parse(raw: &str) -> Option<Line> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Some(Line::Numeric(normalize_zero(v))),
            Ok(_) => None,
            Err(_) => Some(Line::Named(raw.to_string())),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Line::Numeric(v) => Some(*v),
            Line::Named(_) => None,
        }
    }
}

fn normalize_zero(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

impl PartialEq for Line {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Line {}

impl Hash for Line {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Line::Numeric(v) => {
                0u8.hash(state);
                normalize_zero(*v).to_bits().hash(state);
            }
            Line::Named(s) => {
                1u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl PartialOrd for Line {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Line {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Line::Numeric(a), Line::Numeric(b)) => {
                normalize_zero(*a).total_cmp(&normalize_zero(*b))
            }
            (Line::Numeric(_), Line::Named(_)) => Ordering::Less,
            (Line::Named(_), Line::Numeric(_)) => Ordering::Greater,
            (Line::Named(a), Line::Named(b)) => a.cmp(b),
        }
    }
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Line::Numeric(v) => write!(f, "{v}"),
            Line::Named(s) => write!(f, "{s}"),
        }
    }
}

/// Renders a sorted line set as `[-6, -5.5, home]`.
pub fn format_lines<'a>(lines: impl IntoIterator<Item = &'a Line>) -> String {
    let parts: Vec<String> = lines.into_iter().map(|l| l.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

// ---------------------------------------------------------------------------
// Anomaly classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyType {
    OddsDrop,
    OddsRise,
    LimitCut,
    /// Limit went to zero or price collapsed to the block threshold.
    BetBlocked,
    NewLine,
    LineExpansion,
    LineNarrowing,
    MarketRemoved,
    MatchRemoved,
    BookmakerOutage,
    CrossBookmakerDivergence,
}

impl AnomalyType {
    pub const ALL: [AnomalyType; 11] = [
        AnomalyType::OddsDrop,
        AnomalyType::OddsRise,
        AnomalyType::LimitCut,
        AnomalyType::BetBlocked,
        AnomalyType::NewLine,
        AnomalyType::LineExpansion,
        AnomalyType::LineNarrowing,
        AnomalyType::MarketRemoved,
        AnomalyType::MatchRemoved,
        AnomalyType::BookmakerOutage,
        AnomalyType::CrossBookmakerDivergence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::OddsDrop => "ODDS_DROP",
            AnomalyType::OddsRise => "ODDS_RISE",
            AnomalyType::LimitCut => "LIMIT_CUT",
            AnomalyType::BetBlocked => "BET_BLOCKED",
            AnomalyType::NewLine => "NEW_LINE",
            AnomalyType::LineExpansion => "LINE_EXPANSION",
            AnomalyType::LineNarrowing => "LINE_NARROWING",
            AnomalyType::MarketRemoved => "MARKET_REMOVED",
            AnomalyType::MatchRemoved => "MATCH_REMOVED",
            AnomalyType::BookmakerOutage => "BOOKMAKER_OUTAGE",
            AnomalyType::CrossBookmakerDivergence => "CROSS_BOOKMAKER_DIVERGENCE",
        }
    }
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnomalyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnomalyType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown anomaly type: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Candidates and records
// ---------------------------------------------------------------------------

/// Match id carried by bookmaker-wide events that belong to no match.
pub const NO_MATCH_ID: i64 = 0;

/// An anomaly detected during the current pass, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyCandidate {
    pub match_id: i64,
    /// `None` for match-wide events.
    pub bookmaker_id: Option<i64>,
    pub anomaly_type: AnomalyType,
    pub before_odd: Option<f64>,
    pub after_odd: Option<f64>,
    pub before_limit: Option<f64>,
    pub after_limit: Option<f64>,
    pub diff_pct: Option<f64>,
    pub window_seconds: Option<i64>,
    /// Part of the dedup key, so it must be deterministic for an unchanged condition.
    pub comment: String,
    pub is_live: bool,
}

impl AnomalyCandidate {
    /// A candidate with only the key fields set; rules fill in the rest.
    pub fn new(
        match_id: i64,
        bookmaker_id: Option<i64>,
        anomaly_type: AnomalyType,
        comment: String,
    ) -> Self {
        Self {
            match_id,
            bookmaker_id,
            anomaly_type,
            before_odd: None,
            after_odd: None,
            before_limit: None,
            after_limit: None,
            diff_pct: None,
            window_seconds: None,
            comment,
            is_live: false,
        }
    }
}

/// A persisted anomaly. Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyRecord {
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    pub candidate: AnomalyCandidate,
}

/// Most recent observation time for one bookmaker across all history.
#[derive(Debug, Clone, PartialEq)]
pub struct BookmakerHeartbeat {
    pub bookmaker_id: i64,
    pub last_seen: DateTime<Utc>,
}
