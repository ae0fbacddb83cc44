pub mod divergence;
pub mod grouping;
pub mod lines;
pub mod markets;
pub mod outage;
pub mod price;

use crate::config::Thresholds;
use crate::types::{AnomalyCandidate, Observation};

/// Runs every windowed rule over one batch of observations.
///
/// Groupings are rebuilt from scratch on each call. Output order is
/// deterministic: rule by rule, then by grouping key. The outage rule is not
/// included here since it reads global history rather than the window.
pub fn evaluate_window(rows: &[Observation], t: &Thresholds) -> Vec<AnomalyCandidate> {
    if rows.is_empty() {
        return Vec::new();
    }

    let lines = grouping::by_line(rows);
    let markets = grouping::by_market(rows);
    let matches = grouping::by_match(rows);

    let mut out = price::odds_jumps(&lines, t);
    out.extend(price::limit_cuts(&lines, t));
    out.extend(price::bet_blocks(&lines, t));
    out.extend(lines::line_changes(&markets, t));
    out.extend(markets::market_removals(&matches, t));
    if t.divergence_enabled {
        out.extend(divergence::divergences(&grouping::by_outcome(rows), t));
    }
    out
}
