use std::collections::BTreeMap;

use crate::config::Thresholds;
use crate::detector::grouping::{OutcomeKey, Partition};
use crate::types::{AnomalyCandidate, AnomalyType, Observation};

/// CROSS_BOOKMAKER_DIVERGENCE: bookmakers disagree on the same outcome.
///
/// Uses each bookmaker's latest price in the window. Prices at or below
/// `divergence_min_odd` are dropped first, so near-certain outcomes never
/// register a spread. The anomaly belongs to the bookmaker quoting the higher
/// (more favorable) price.
pub fn divergences(groups: &BTreeMap<OutcomeKey, Partition<'_>>, t: &Thresholds) -> Vec<AnomalyCandidate> {
    let mut out = Vec::new();

    for ((match_id, market, line), p) in groups {
        let mut latest: BTreeMap<i64, &Observation> = BTreeMap::new();
        for o in p.rows() {
            latest.insert(o.bookmaker_id, o);
        }

        let quotes: Vec<&Observation> = latest
            .into_values()
            .filter(|o| o.odd > t.divergence_min_odd)
            .collect();
        if quotes.len() < 2 {
            continue;
        }

        // Ties resolve to the lowest bookmaker id on both ends.
        let Some(low) = quotes.iter().copied().reduce(|a, b| if b.odd < a.odd { b } else { a }) else {
            continue;
        };
        let Some(high) = quotes.iter().copied().reduce(|a, b| if b.odd > a.odd { b } else { a }) else {
            continue;
        };

        let diff_pct = (high.odd - low.odd) / low.odd * 100.0;
        if diff_pct < t.divergence_pct {
            continue;
        }

        let comment = format!(
            "{market} {line}: bookmaker {}={:.2} vs bookmaker {}={:.2} ({diff_pct:.1}%)",
            low.bookmaker_id, low.odd, high.bookmaker_id, high.odd,
        );
        let mut c = AnomalyCandidate::new(
            *match_id,
            Some(high.bookmaker_id),
            AnomalyType::CrossBookmakerDivergence,
            comment,
        );
        c.before_odd = Some(low.odd);
        c.after_odd = Some(high.odd);
        c.diff_pct = Some(diff_pct);
        c.is_live = high.is_live;
        out.push(c);
    }

    out
}
