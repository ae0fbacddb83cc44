use std::collections::{BTreeMap, BTreeSet};

use chrono::Duration;

use crate::config::Thresholds;
use crate::detector::grouping::{MatchKey, Partition};
use crate::types::{AnomalyCandidate, AnomalyType};

/// MARKET_REMOVED / MATCH_REMOVED for one (match, bookmaker).
///
/// Both snapshots are anchored on the partition's own first and last capture,
/// so other matches scraped on a different cycle never shift this match's
/// end snapshot.
pub fn market_removals(matches: &BTreeMap<MatchKey, Partition<'_>>, t: &Thresholds) -> Vec<AnomalyCandidate> {
    let eps = Duration::seconds(t.snapshot_eps_seconds);
    let mut out = Vec::new();

    for ((match_id, bookmaker_id), p) in matches {
        if !p.has_span() {
            continue;
        }

        let start: BTreeSet<&str> = p.start_snapshot(eps).map(|o| o.market_type.as_str()).collect();
        let end: BTreeSet<&str> = p.end_snapshot(eps).map(|o| o.market_type.as_str()).collect();

        let removed: Vec<&str> = start.difference(&end).copied().collect();
        if removed.is_empty() {
            continue;
        }

        let (anomaly_type, comment) = if removed.len() == start.len() {
            (
                AnomalyType::MatchRemoved,
                format!("All markets removed: [{}]", removed.join(", ")),
            )
        } else {
            (
                AnomalyType::MarketRemoved,
                format!("Removed markets: [{}]", removed.join(", ")),
            )
        };

        let mut c = AnomalyCandidate::new(*match_id, Some(*bookmaker_id), anomaly_type, comment);
        c.window_seconds = Some(p.span_seconds());
        c.is_live = p.after().is_live;
        out.push(c);
    }

    out
}
