use std::collections::{BTreeMap, BTreeSet};

use chrono::Duration;

use crate::config::Thresholds;
use crate::detector::grouping::{MarketKey, Partition};
use crate::types::{format_lines, AnomalyCandidate, AnomalyType, Line};

/// NEW_LINE / LINE_EXPANSION / LINE_NARROWING for one (match, bookmaker, market).
///
/// Compares the set of lines quoted near the window start with the set quoted
/// near the window end. Expansion is only reported together with a new line
/// that lies outside the numeric range offered at the start.
pub fn line_changes(groups: &BTreeMap<MarketKey, Partition<'_>>, t: &Thresholds) -> Vec<AnomalyCandidate> {
    let eps = Duration::seconds(t.snapshot_eps_seconds);
    let mut out = Vec::new();

    for ((match_id, bookmaker_id, market), p) in groups {
        if !p.has_span() {
            continue;
        }

        let start: BTreeSet<&Line> = p.start_snapshot(eps).map(|o| &o.line).collect();
        let end: BTreeSet<&Line> = p.end_snapshot(eps).map(|o| &o.line).collect();

        let added: Vec<&Line> = end.difference(&start).copied().collect();
        let removed: Vec<&Line> = start.difference(&end).copied().collect();

        let emit = |anomaly_type: AnomalyType, comment: String| {
            let mut c = AnomalyCandidate::new(*match_id, Some(*bookmaker_id), anomaly_type, comment);
            c.window_seconds = Some(p.span_seconds());
            c.is_live = p.after().is_live;
            c
        };

        if !added.is_empty() {
            out.push(emit(
                AnomalyType::NewLine,
                format!("{market}: added lines {}", format_lines(added.iter().copied())),
            ));

            if extends_range(&start, &added) {
                out.push(emit(
                    AnomalyType::LineExpansion,
                    format!("{market}: expansion {}", format_lines(added.iter().copied())),
                ));
            }
        }

        if !removed.is_empty() {
            out.push(emit(
                AnomalyType::LineNarrowing,
                format!("{market}: removed lines {}", format_lines(removed.iter().copied())),
            ));
        }
    }

    out
}

/// True if any added numeric line lies beyond the prior min/max.
/// Named outcomes have no range and never expand it.
fn extends_range(start: &BTreeSet<&Line>, added: &[&Line]) -> bool {
    let prior: Vec<f64> = start.iter().filter_map(|l| l.as_f64()).collect();
    let (Some(min), Some(max)) = (
        prior.iter().copied().reduce(f64::min),
        prior.iter().copied().reduce(f64::max),
    ) else {
        return false;
    };

    added
        .iter()
        .filter_map(|l| l.as_f64())
        .any(|v| v > max || v < min)
}
