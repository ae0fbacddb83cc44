use std::collections::BTreeMap;

use crate::config::Thresholds;
use crate::detector::grouping::{LineKey, Partition};
use crate::types::{AnomalyCandidate, AnomalyType, Observation};

/// ODDS_DROP / ODDS_RISE: earliest vs latest price on one line.
/// Both the relative and the absolute move must clear their thresholds, so a
/// 1.05 → 1.20 wobble on a short price does not count as a jump.
pub fn odds_jumps(groups: &BTreeMap<LineKey, Partition<'_>>, t: &Thresholds) -> Vec<AnomalyCandidate> {
    let mut out = Vec::new();

    for ((match_id, bookmaker_id, market, line), p) in groups {
        if !p.has_span() {
            continue;
        }
        let (before, after) = (p.before(), p.after());
        if before.odd <= 0.0 || after.odd <= 0.0 {
            continue;
        }

        let diff_abs = after.odd - before.odd;
        let diff_pct = diff_abs / before.odd * 100.0;
        if diff_pct.abs() < t.odds_jump_pct || diff_abs.abs() < t.odds_jump_abs {
            continue;
        }

        let anomaly_type = if diff_pct < 0.0 {
            AnomalyType::OddsDrop
        } else {
            AnomalyType::OddsRise
        };
        let comment = format!(
            "{market} {line}: {:.2} -> {:.2} ({diff_pct:+.1}%)",
            before.odd, after.odd,
        );

        let mut c = compared(*match_id, *bookmaker_id, anomaly_type, comment, p);
        c.diff_pct = Some(diff_pct);
        out.push(c);
    }

    out
}

/// LIMIT_CUT: the stake limit shrank by at least `limit_cut_pct` percent or
/// `limit_cut_abs` units. Increases are never reported, and a missing latest
/// limit means "untracked", not "cut to zero".
pub fn limit_cuts(groups: &BTreeMap<LineKey, Partition<'_>>, t: &Thresholds) -> Vec<AnomalyCandidate> {
    let mut out = Vec::new();

    for ((match_id, bookmaker_id, market, line), p) in groups {
        if !p.has_span() {
            continue;
        }
        let (Some(before), Some(after)) = (p.before().limit_value, p.after().limit_value) else {
            continue;
        };
        if before <= 0.0 || after >= before {
            continue;
        }

        let cut_abs = before - after;
        let cut_pct = cut_abs / before * 100.0;
        if cut_pct < t.limit_cut_pct && cut_abs < t.limit_cut_abs {
            continue;
        }

        let diff_pct = -cut_pct;
        let comment = format!("{market} {line}: limit {before:.0} -> {after:.0} ({diff_pct:+.1}%)");

        let mut c = compared(*match_id, *bookmaker_id, AnomalyType::LimitCut, comment, p);
        c.diff_pct = Some(diff_pct);
        out.push(c);
    }

    out
}

/// BET_BLOCKED: the line went from open to blocked inside the window. A zero
/// limit is a block; so is a price collapsed to `block_odd_threshold`.
/// A line that is absent from the window is not blocked, just unseen.
pub fn bet_blocks(groups: &BTreeMap<LineKey, Partition<'_>>, t: &Thresholds) -> Vec<AnomalyCandidate> {
    let mut out = Vec::new();

    for ((match_id, bookmaker_id, market, line), p) in groups {
        if !p.has_span() {
            continue;
        }
        let (before, after) = (p.before(), p.after());
        if is_blocked(before, t) || !is_blocked(after, t) {
            continue;
        }

        let limit = after
            .limit_value
            .map(|l| format!("{l:.0}"))
            .unwrap_or_else(|| "n/a".to_string());
        let comment = format!("{market} {line}: blocked (odd {:.2}, limit {limit})", after.odd);

        out.push(compared(*match_id, *bookmaker_id, AnomalyType::BetBlocked, comment, p));
    }

    out
}

fn is_blocked(o: &Observation, t: &Thresholds) -> bool {
    o.odd <= t.block_odd_threshold || o.limit_value.is_some_and(|l| l <= 0.0)
}

/// Candidate carrying the before/after prices and limits of a line partition.
fn compared(
    match_id: i64,
    bookmaker_id: i64,
    anomaly_type: AnomalyType,
    comment: String,
    p: &Partition<'_>,
) -> AnomalyCandidate {
    let (before, after) = (p.before(), p.after());
    let mut c = AnomalyCandidate::new(match_id, Some(bookmaker_id), anomaly_type, comment);
    c.before_odd = Some(before.odd);
    c.after_odd = Some(after.odd);
    c.before_limit = before.limit_value;
    c.after_limit = after.limit_value;
    c.window_seconds = Some(p.span_seconds());
    c.is_live = after.is_live;
    c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::grouping::by_line;
    use crate::detector::grouping::fixtures::obs;

    fn thresholds() -> Thresholds {
        Thresholds::default()
    }

    #[test]
    fn twenty_percent_drop_is_flagged() {
        let rows = vec![
            obs(7, 1, "1X2", 1.0, 2.00, None, 0),
            obs(7, 1, "1X2", 1.0, 1.85, None, 300),
            obs(7, 1, "1X2", 1.0, 1.60, None, 900),
        ];
        let out = odds_jumps(&by_line(&rows), &thresholds());

        assert_eq!(out.len(), 1);
        let c = &out[0];
        assert_eq!(c.anomaly_type, AnomalyType::OddsDrop);
        assert_eq!(c.bookmaker_id, Some(1));
        assert_eq!(c.before_odd, Some(2.00));
        assert_eq!(c.after_odd, Some(1.60));
        assert!((c.diff_pct.unwrap() + 20.0).abs() < 1e-9);
        assert_eq!(c.window_seconds, Some(900));
        assert_eq!(c.comment, "1X2 1: 2.00 -> 1.60 (-20.0%)");
    }

    #[test]
    fn rise_and_drop_are_exclusive() {
        let rows = vec![
            obs(7, 1, "1X2", 2.0, 3.00, None, 0),
            obs(7, 1, "1X2", 2.0, 3.80, None, 600),
        ];
        let out = odds_jumps(&by_line(&rows), &thresholds());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].anomaly_type, AnomalyType::OddsRise);
    }

    #[test]
    fn small_absolute_move_on_short_price_is_ignored() {
        // +16% but only 0.08 in absolute terms
        let rows = vec![
            obs(7, 1, "1X2", 1.0, 0.50, None, 0),
            obs(7, 1, "1X2", 1.0, 0.58, None, 600),
        ];
        assert!(odds_jumps(&by_line(&rows), &thresholds()).is_empty());
    }

    #[test]
    fn non_positive_before_price_is_skipped() {
        let rows = vec![
            obs(7, 1, "1X2", 1.0, 0.0, None, 0),
            obs(7, 1, "1X2", 1.0, 2.5, None, 600),
        ];
        assert!(odds_jumps(&by_line(&rows), &thresholds()).is_empty());
    }

    #[test]
    fn equal_timestamps_never_compare() {
        let rows = vec![
            obs(7, 1, "1X2", 1.0, 2.0, Some(500.0), 60),
            obs(7, 1, "1X2", 1.0, 1.2, Some(10.0), 60),
        ];
        let groups = by_line(&rows);
        assert!(odds_jumps(&groups, &thresholds()).is_empty());
        assert!(limit_cuts(&groups, &thresholds()).is_empty());
    }

    #[test]
    fn sixty_percent_limit_cut_is_flagged() {
        let rows = vec![
            obs(7, 1, "TOTAL", 2.5, 1.9, Some(500.0), 0),
            obs(7, 1, "TOTAL", 2.5, 1.9, Some(200.0), 600),
        ];
        let out = limit_cuts(&by_line(&rows), &thresholds());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].anomaly_type, AnomalyType::LimitCut);
        assert_eq!(out[0].before_limit, Some(500.0));
        assert_eq!(out[0].after_limit, Some(200.0));
        assert!((out[0].diff_pct.unwrap() + 60.0).abs() < 1e-9);
        assert_eq!(out[0].comment, "TOTAL 2.5: limit 500 -> 200 (-60.0%)");
    }

    #[test]
    fn small_limit_cut_is_ignored() {
        let rows = vec![
            obs(7, 1, "TOTAL", 2.5, 1.9, Some(500.0), 0),
            obs(7, 1, "TOTAL", 2.5, 1.9, Some(480.0), 600),
        ];
        assert!(limit_cuts(&by_line(&rows), &thresholds()).is_empty());
    }

    #[test]
    fn absolute_floor_alone_flags_a_cut() {
        // 10% but 100 units
        let rows = vec![
            obs(7, 1, "TOTAL", 2.5, 1.9, Some(1000.0), 0),
            obs(7, 1, "TOTAL", 2.5, 1.9, Some(900.0), 600),
        ];
        assert_eq!(limit_cuts(&by_line(&rows), &thresholds()).len(), 1);
    }

    #[test]
    fn limit_increase_and_missing_limits_are_ignored() {
        let rows = vec![
            obs(7, 1, "TOTAL", 2.5, 1.9, Some(200.0), 0),
            obs(7, 1, "TOTAL", 2.5, 1.9, Some(500.0), 600),
            obs(7, 2, "TOTAL", 2.5, 1.9, Some(500.0), 0),
            obs(7, 2, "TOTAL", 2.5, 1.9, None, 600),
            obs(7, 3, "TOTAL", 2.5, 1.9, Some(0.0), 0),
            obs(7, 3, "TOTAL", 2.5, 1.9, Some(0.0), 600),
        ];
        assert!(limit_cuts(&by_line(&rows), &thresholds()).is_empty());
    }

    #[test]
    fn zero_limit_blocks_once_on_transition() {
        let rows = vec![
            obs(7, 1, "TOTAL", 2.5, 1.9, Some(500.0), 0),
            obs(7, 1, "TOTAL", 2.5, 1.9, Some(0.0), 600),
            // already blocked at window start
            obs(7, 2, "TOTAL", 2.5, 1.9, Some(0.0), 0),
            obs(7, 2, "TOTAL", 2.5, 1.9, Some(0.0), 600),
        ];
        let out = bet_blocks(&by_line(&rows), &thresholds());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bookmaker_id, Some(1));
        assert_eq!(out[0].comment, "TOTAL 2.5: blocked (odd 1.90, limit 0)");
    }

    #[test]
    fn collapsed_price_counts_as_block() {
        let rows = vec![
            obs(7, 1, "1X2", 1.0, 1.40, None, 0),
            obs(7, 1, "1X2", 1.0, 1.01, None, 600),
        ];
        let out = bet_blocks(&by_line(&rows), &thresholds());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].comment, "1X2 1: blocked (odd 1.01, limit n/a)");
    }
}
