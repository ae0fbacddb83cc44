use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::Thresholds;
use crate::types::{AnomalyCandidate, AnomalyType, BookmakerHeartbeat, NO_MATCH_ID};

/// BOOKMAKER_OUTAGE: a bookmaker whose most recent observation, over all
/// history, is older than `outage_minutes`. Independent of the analysis window.
pub fn outages(
    heartbeats: &[BookmakerHeartbeat],
    now: DateTime<Utc>,
    t: &Thresholds,
) -> Vec<AnomalyCandidate> {
    let threshold = Duration::minutes(t.outage_minutes);

    heartbeats
        .iter()
        .filter_map(|hb| {
            let silent_for = now - hb.last_seen;
            if silent_for <= threshold {
                return None;
            }
            debug!(
                bookmaker_id = hb.bookmaker_id,
                silent_minutes = silent_for.num_minutes(),
                "[OUTAGE] bookmaker silent"
            );
            Some(AnomalyCandidate::new(
                NO_MATCH_ID,
                Some(hb.bookmaker_id),
                AnomalyType::BookmakerOutage,
                format!("No updates >{} min", t.outage_minutes),
            ))
        })
        .collect()
}
