//! # Discord Webhook Integration
//!
//! Posts a short summary embed to a Discord channel after every crawl run:
//! how many restaurants were written, how many items could not be fetched or
//! normalized, and the job counters collected by the pipeline.
//!
//! ## Rate Limits
//!
//! Discord webhooks accept 30 requests per minute; one message per run stays
//! far below that even with a tight `CRAWL_SCHEDULE`.
//!
//! ## Configuration
//!
//! The webhook URL comes from `DISCORD_WEBHOOK_URL` through
//! [`AppConfig`](crate::config::AppConfig). Without it, summaries are skipped.

use anyhow::Result;
use reqwest::Client;
use tracing::{error, info, warn};

use crate::models::{DiscordEmbed, DiscordField, DiscordMessage};
use crate::restaurant_finder::RunSummary;

const EMBED_COLOR_OK: u32 = 0x0058_65F2;
const EMBED_COLOR_ERRORS: u32 = 0x00ED_4245;

/// Discord webhook client for crawl run summaries.
///
/// Cheap to clone; the underlying `reqwest::Client` shares its connection
/// pool between clones.
pub struct DiscordNotifier {
    client: Client,
    /// If `None`, summaries are skipped.
    webhook_url: Option<String>,
}

impl DiscordNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        if webhook_url.is_none() {
            warn!("DISCORD_WEBHOOK_URL not set - Discord notifications will be disabled");
        }

        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Sends the summary of one crawl run.
    ///
    /// ## Error Handling
    ///
    /// - **Missing webhook URL**: returns `Ok(())` without sending
    /// - **Network failures**: propagated as `anyhow::Error`
    /// - **HTTP errors**: logged with the status code, not propagated
    pub async fn send_summary(&self, summary: &RunSummary) -> Result<()> {
        let Some(webhook_url) = &self.webhook_url else {
            return Ok(());
        };

        let message = DiscordMessage {
            embeds: vec![summary_embed(summary)],
        };

        let response = self.client.post(webhook_url).json(&message).send().await?;

        if response.status().is_success() {
            info!("Discord summary sent for run at {}", summary.finished_at);
        } else {
            error!("Failed to send Discord notification: {}", response.status());
        }

        Ok(())
    }
}

fn summary_embed(summary: &RunSummary) -> DiscordEmbed {
    let failed_items = summary.fetch_errors + summary.normalization_errors;
    let field = |name: &str, value: String| DiscordField {
        name: name.to_string(),
        value,
        inline: true,
    };

    DiscordEmbed {
        title: "🍽️ Restaurant crawl finished".to_string(),
        description: format!("{} restaurants from {}", summary.restaurants, summary.site),
        color: if failed_items == 0 {
            EMBED_COLOR_OK
        } else {
            EMBED_COLOR_ERRORS
        },
        timestamp: summary.finished_at.to_rfc3339(),
        fields: vec![
            field("Listing entries", summary.listing_entries.to_string()),
            field("Fetch errors", summary.fetch_errors.to_string()),
            field("Skipped records", summary.normalization_errors.to_string()),
            field(
                "Jobs",
                format!(
                    "{} ok / {} failed",
                    summary.metrics.jobs_succeeded, summary.metrics.jobs_failed
                ),
            ),
        ],
    }
}

impl Clone for DiscordNotifier {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            webhook_url: self.webhook_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::pipeline::MetricsSnapshot;

    fn summary(fetch_errors: usize) -> RunSummary {
        RunSummary {
            site: "TripAdvisor".into(),
            listing_entries: 30,
            restaurants: 29,
            fetch_errors,
            normalization_errors: 1,
            metrics: MetricsSnapshot {
                jobs_succeeded: 31,
                jobs_failed: fetch_errors,
                records_extracted: 400,
            },
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn embed_reports_counts() {
        let embed = summary_embed(&summary(0));

        assert_eq!(embed.description, "29 restaurants from TripAdvisor");
        assert_eq!(embed.fields[0].value, "30");
        assert_eq!(embed.fields[3].value, "31 ok / 0 failed");
        assert_eq!(embed.color, EMBED_COLOR_ERRORS);
    }

    #[tokio::test]
    async fn disabled_notifier_is_a_no_op() {
        let notifier = DiscordNotifier::new(None);

        assert!(!notifier.is_enabled());
        notifier.send_summary(&summary(2)).await.unwrap();
    }
}
