//! Discord incoming webhook notifications

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::info;

use super::{DeliveryReport, Notification, NotificationSink};

/// Discord rejects message content longer than this
pub const DISCORD_CONTENT_LIMIT: usize = 2000;

/// Posts notifications to a Discord channel webhook
#[derive(Debug, Clone)]
pub struct DiscordWebhookSink {
    http: Client,
    webhook_url: String,
}

impl DiscordWebhookSink {
    pub fn new(http: Client, webhook_url: impl Into<String>) -> Self {
        Self {
            http,
            webhook_url: webhook_url.into(),
        }
    }

    fn content(notification: &Notification) -> String {
        let content = if notification.title.trim().is_empty() {
            notification.message.clone()
        } else {
            format!("**{}**\n{}", notification.title, notification.message)
        };
        if content.chars().count() > DISCORD_CONTENT_LIMIT {
            content.chars().take(DISCORD_CONTENT_LIMIT).collect()
        } else {
            content
        }
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhookSink {
    async fn deliver(&self, notification: &Notification) -> DeliveryReport {
        let payload = json!({ "content": Self::content(notification) });

        let response = match self.http.post(&self.webhook_url).json(&payload).send().await {
            Ok(response) => response,
            Err(e) => return DeliveryReport::failed(self.name(), format!("request failed: {}", e)),
        };

        let status = response.status();
        if status.is_success() {
            info!("Discord webhook message sent");
            DeliveryReport::delivered(self.name())
        } else {
            let body = response.text().await.unwrap_or_default();
            DeliveryReport::failed(self.name(), format!("HTTP {}: {}", status.as_u16(), body))
        }
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_prefixes_title() {
        let content = DiscordWebhookSink::content(&Notification::new("Done", "body"));
        assert_eq!(content, "**Done**\nbody");
        assert_eq!(DiscordWebhookSink::content(&Notification::new("", "body")), "body");
    }

    #[test]
    fn test_content_respects_discord_limit() {
        let content = DiscordWebhookSink::content(&Notification::new("", "ü".repeat(2500)));
        assert_eq!(content.chars().count(), DISCORD_CONTENT_LIMIT);
    }
}
