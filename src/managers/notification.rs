//! Discord webhook notification manager
//!
//! Posts an embed to a Discord webhook after a backup run, for the events
//! listed in `notifications.notify_on`. Delivery failures are logged by the
//! caller and never affect the run itself.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::config::{NotificationConfig, NotifyEvent};

const MAX_ERROR_CHARS: usize = 500;

/// Notification manager for sending Discord webhooks
pub struct NotificationManager {
    config: NotificationConfig,
    client: reqwest::Client,
}

/// Discord embed color codes (decimal)
#[derive(Debug, Clone, Copy)]
pub enum NotificationColor {
    /// Red - for failures
    Failure = 15158332, // #E74C3C
    /// Green - for success
    Success = 3066993, // #2ECC71
}

impl NotificationColor {
    fn as_decimal(&self) -> u32 {
        *self as u32
    }
}

/// Outcome of one backup run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub event: NotifyEvent,
    pub strategy: String,
    pub storage: String,
    pub trigger: &'static str,
    pub error: Option<String>,
    pub duration_secs: u64,
}

/// Discord webhook payload
#[derive(Debug, Serialize)]
struct DiscordPayload {
    username: String,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<DiscordField>,
    footer: DiscordFooter,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct DiscordField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct DiscordFooter {
    text: String,
}

impl NotificationManager {
    pub fn new(config: NotificationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { config, client })
    }

    /// Check if notifications are enabled for an event type
    pub fn is_enabled(&self, event: NotifyEvent) -> bool {
        !self.config.discord_webhook_url.is_empty() && self.config.notify_on.contains(&event)
    }

    /// Send a notification for `outcome` if its event is enabled
    pub async fn notify(&self, outcome: &RunOutcome) -> Result<()> {
        if !self.is_enabled(outcome.event) {
            debug!("Notification type {:?} not enabled, skipping", outcome.event);
            return Ok(());
        }

        let payload = build_payload(outcome);
        let response = self
            .client
            .post(&self.config.discord_webhook_url)
            .json(&payload)
            .send()
            .await
            .context("Failed to send Discord webhook")?;

        let status = response.status();
        if status.is_success() {
            debug!("Discord webhook sent successfully");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Discord webhook failed with status {}: {}", status, body)
        }
    }
}

fn build_payload(outcome: &RunOutcome) -> DiscordPayload {
    let (color, emoji) = match outcome.event {
        NotifyEvent::Failure => (NotificationColor::Failure, "\u{274C}"),
        NotifyEvent::Success => (NotificationColor::Success, "\u{2705}"),
    };

    let mut fields = vec![
        DiscordField {
            name: "Strategy".to_string(),
            value: outcome.strategy.clone(),
            inline: true,
        },
        DiscordField {
            name: "Storage".to_string(),
            value: outcome.storage.clone(),
            inline: true,
        },
        DiscordField {
            name: "Trigger".to_string(),
            value: outcome.trigger.to_string(),
            inline: true,
        },
        DiscordField {
            name: "Duration".to_string(),
            value: format_duration(outcome.duration_secs),
            inline: true,
        },
    ];

    if let Some(error) = &outcome.error {
        let error_display = if error.chars().count() > MAX_ERROR_CHARS {
            let truncated: String = error.chars().take(MAX_ERROR_CHARS - 3).collect();
            format!("{}...", truncated)
        } else {
            error.clone()
        };
        fields.push(DiscordField {
            name: "Error".to_string(),
            value: format!("```\n{}\n```", error_display),
            inline: false,
        });
    }

    DiscordPayload {
        username: "Backup Runner".to_string(),
        embeds: vec![DiscordEmbed {
            title: format!("{} Backup {:?}: {}", emoji, outcome.event, outcome.strategy),
            color: color.as_decimal(),
            fields,
            footer: DiscordFooter {
                text: "backup-runner".to_string(),
            },
            timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }],
    }
}

/// Format duration in human-readable form
fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        let (minutes, secs) = (seconds / 60, seconds % 60);
        if secs == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, secs)
        }
    } else {
        let (hours, minutes) = (seconds / 3600, (seconds % 3600) / 60);
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}
