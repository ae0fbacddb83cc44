use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{Config, TelegramConfig, NOTIFY_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::{AnomalyRecord, AnomalyType, NO_MATCH_ID};

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

/// Best-effort Telegram alerts for freshly recorded anomalies.
/// Delivery is never confirmed and failures never reach the pipeline.
pub struct TelegramNotifier {
    client: reqwest::Client,
    cfg: TelegramConfig,
    types: HashSet<AnomalyType>,
}

impl TelegramNotifier {
    /// `None` when no credentials are configured.
    pub fn from_config(cfg: &Config) -> Result<Option<Self>> {
        let Some(telegram) = cfg.telegram.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
            .build()?;
        Ok(Some(Self {
            client,
            cfg: telegram,
            types: cfg.notify_types.clone(),
        }))
    }

    pub fn wants(&self, anomaly_type: AnomalyType) -> bool {
        self.types.contains(&anomaly_type)
    }

    /// Sends the alert if its type is selected. Errors are logged and dropped.
    pub async fn notify(&self, record: &AnomalyRecord) {
        if !self.wants(record.candidate.anomaly_type) {
            return;
        }
        match self.send(&format_alert(record)).await {
            Ok(()) => debug!(id = %record.id, "[NOTIFY] alert sent"),
            Err(e) => warn!(id = %record.id, "[NOTIFY] alert dropped: {e}"),
        }
    }

    async fn send(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.cfg.api_url, self.cfg.token);
        let body = SendMessage {
            chat_id: &self.cfg.chat_id,
            text,
            disable_web_page_preview: true,
        };

        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(AppError::Notification(format!("telegram returned {}", resp.status())));
        }
        Ok(())
    }
}

pub fn format_alert(record: &AnomalyRecord) -> String {
    let c = &record.candidate;
    let mut lines = vec![format!("⚠ {}", c.anomaly_type)];

    let mut subject = Vec::new();
    if c.match_id != NO_MATCH_ID {
        subject.push(format!("match #{}", c.match_id));
    }
    if let Some(b) = c.bookmaker_id {
        subject.push(format!("bookmaker {b}"));
    }
    if c.is_live {
        subject.push("live".to_string());
    }
    if !subject.is_empty() {
        lines.push(subject.join(" | "));
    }

    lines.push(c.comment.clone());
    lines.push(record.occurred_at.format("%Y-%m-%d %H:%M UTC").to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::grouping::fixtures::t0;
    use crate::types::AnomalyCandidate;

    fn record(candidate: AnomalyCandidate) -> AnomalyRecord {
        AnomalyRecord { id: "id-1".to_string(), occurred_at: t0(), candidate }
    }

    #[test]
    fn alert_names_match_and_bookmaker() {
        let mut c = AnomalyCandidate::new(7, Some(1), AnomalyType::OddsDrop, "1X2 1: 2.00 -> 1.60 (-20.0%)".into());
        c.is_live = true;
        assert_eq!(
            format_alert(&record(c)),
            "⚠ ODDS_DROP\nmatch #7 | bookmaker 1 | live\n1X2 1: 2.00 -> 1.60 (-20.0%)\n2024-05-01 12:00 UTC"
        );
    }

    #[test]
    fn outage_alert_omits_placeholder_match() {
        let c = AnomalyCandidate::new(NO_MATCH_ID, Some(4), AnomalyType::BookmakerOutage, "No updates >20 min".into());
        assert_eq!(
            format_alert(&record(c)),
            "⚠ BOOKMAKER_OUTAGE\nbookmaker 4\nNo updates >20 min\n2024-05-01 12:00 UTC"
        );
    }

    #[test]
    fn notifier_is_disabled_without_credentials() {
        assert!(TelegramNotifier::from_config(&Config::default()).unwrap().is_none());
    }

    #[test]
    fn only_selected_types_are_wanted() {
        let mut cfg = Config::default();
        cfg.telegram = Some(TelegramConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            token: "t".to_string(),
            chat_id: "c".to_string(),
        });
        let notifier = TelegramNotifier::from_config(&cfg).unwrap().unwrap();
        assert!(notifier.wants(AnomalyType::LimitCut));
        assert!(!notifier.wants(AnomalyType::LineNarrowing));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_swallowed() {
        let mut cfg = Config::default();
        cfg.telegram = Some(TelegramConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            token: "t".to_string(),
            chat_id: "c".to_string(),
        });
        let notifier = TelegramNotifier::from_config(&cfg).unwrap().unwrap();
        let c = AnomalyCandidate::new(7, Some(1), AnomalyType::OddsDrop, "x".into());
        // completes without panicking or returning an error
        notifier.notify(&record(c)).await;
    }
}
