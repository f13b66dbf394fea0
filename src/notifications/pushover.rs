//! Pushover push notifications
//!
//! # Setup
//! 1. Create an application at https://pushover.net/apps/build
//! 2. Export `PUSHOVER_TOKEN` (application token) and `PUSHOVER_USER`
//!    (user key), or set them under `[notifications]`

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use super::{DeliveryReport, Notification, NotificationSink};

pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

/// Sends notifications through the Pushover messages API
#[derive(Debug, Clone)]
pub struct PushoverSink {
    http: Client,
    url: String,
    token: String,
    user: String,
}

impl PushoverSink {
    pub fn new(http: Client, token: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            http,
            url: PUSHOVER_API_URL.to_string(),
            token: token.into(),
            user: user.into(),
        }
    }

    /// Override the endpoint (self-hosted relays, tests)
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl NotificationSink for PushoverSink {
    async fn deliver(&self, notification: &Notification) -> DeliveryReport {
        let form = [
            ("token", self.token.as_str()),
            ("user", self.user.as_str()),
            ("message", notification.message.as_str()),
            ("title", notification.title.as_str()),
        ];

        let response = match self.http.post(&self.url).form(&form).send().await {
            Ok(response) => response,
            Err(e) => return DeliveryReport::failed(self.name(), format!("request failed: {}", e)),
        };

        let status = response.status();
        if status.is_success() {
            info!("Pushover notification sent");
            DeliveryReport::delivered(self.name())
        } else {
            let body = response.text().await.unwrap_or_default();
            DeliveryReport::failed(self.name(), format!("HTTP {}: {}", status.as_u16(), body))
        }
    }

    fn name(&self) -> &'static str {
        "pushover"
    }
}
