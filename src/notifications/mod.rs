//! Notification dispatch
//!
//! Delivers a short notice (typically a finished report) to one external
//! sink. Supported sinks:
//! - Pushover: form-encoded push messages
//! - Discord: incoming webhook
//! - Log: writes the notice through tracing, for setups without credentials
//!
//! Delivery never fails the caller. Every attempt produces a
//! [`DeliveryReport`], and a failed one carries a diagnostic instead of an
//! error.

pub mod discord;
pub mod pushover;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{NotificationConfig, SinkKind};
use crate::orchestrator::FinalReport;

pub use discord::DiscordWebhookSink;
pub use pushover::PushoverSink;

/// Longest message body sent to push services
pub const PUSH_MESSAGE_LIMIT: usize = 900;

const TRUNCATION_NOTICE: &str = "...\n\n[Report truncated - see full version in the saved report]";

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static HEADER_MARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"#{1,6}\s*").expect("valid regex"));
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"));
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").expect("valid regex"));
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Strip markup that push clients render as noise
pub fn clean_markdown(text: &str) -> String {
    let text = HTML_TAG.replace_all(text, "");
    let text = HEADER_MARK.replace_all(&text, "");
    let text = BOLD.replace_all(&text, "$1");
    let text = ITALIC.replace_all(&text, "$1");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Cut `text` to at most `limit` characters, appending a truncation notice
/// when anything was removed
pub fn truncate_for_push(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit).collect();
    format!("{}{}", kept, TRUNCATION_NOTICE)
}

/// A message destined for a notification sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    /// Cleaned, push-sized summary of a final report
    pub fn report(title: impl Into<String>, report: &FinalReport) -> Self {
        let cleaned = clean_markdown(&report.report);
        Self::new(title, truncate_for_push(&cleaned, PUSH_MESSAGE_LIMIT))
    }
}

/// Outcome of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed { diagnostic: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub sink: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

impl DeliveryReport {
    pub fn delivered(sink: &str) -> Self {
        Self {
            sink: sink.to_string(),
            status: DeliveryStatus::Delivered,
        }
    }

    pub fn failed(sink: &str, diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        warn!("Notification via {} failed: {}", sink, diagnostic);
        Self {
            sink: sink.to_string(),
            status: DeliveryStatus::Failed { diagnostic },
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self.status, DeliveryStatus::Delivered)
    }
}

impl std::fmt::Display for DeliveryReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.status {
            DeliveryStatus::Delivered => write!(f, "{}: delivered", self.sink),
            DeliveryStatus::Failed { diagnostic } => write!(f, "{}: failed ({})", self.sink, diagnostic),
        }
    }
}

/// A destination for notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Attempt one delivery; no retries
    async fn deliver(&self, notification: &Notification) -> DeliveryReport;

    /// Sink name used in reports and logs
    fn name(&self) -> &'static str;
}

/// Writes notifications to the log
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, notification: &Notification) -> DeliveryReport {
        info!(title = %notification.title, "{}", notification.message);
        DeliveryReport::delivered(self.name())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Shared HTTP client for the webhook-style sinks
fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")
}

/// Build the sink selected by configuration
pub fn sink_from_config(config: &NotificationConfig) -> Result<Arc<dyn NotificationSink>> {
    match config.sink {
        SinkKind::Log => Ok(Arc::new(LogSink)),
        SinkKind::Pushover => {
            let token = config.pushover_token.clone()
                .context("Pushover token not configured (set PUSHOVER_TOKEN)")?;
            let user = config.pushover_user.clone()
                .context("Pushover user key not configured (set PUSHOVER_USER)")?;
            Ok(Arc::new(
                PushoverSink::new(http_client()?, token, user).with_url(&config.pushover_url),
            ))
        }
        SinkKind::Discord => {
            let url = config.discord_webhook_url.clone()
                .context("Discord webhook URL not configured (set DISCORD_WEBHOOK_URL)")?;
            Ok(Arc::new(DiscordWebhookSink::new(http_client()?, url)))
        }
    }
}

/// Deliver in the background; the caller decides whether to await the report
pub fn dispatch_detached(sink: Arc<dyn NotificationSink>, notification: Notification) -> JoinHandle<DeliveryReport> {
    tokio::spawn(async move { sink.deliver(&notification).await })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Task;

    #[test]
    fn test_clean_markdown_strips_markup() {
        let cleaned = clean_markdown("# Title\n\n\n\nSome **bold** and *italic* <b>html</b>\n## Next");
        assert_eq!(cleaned, "Title\n\nSome bold and italic html\nNext");
    }

    #[test]
    fn test_truncate_leaves_short_text_alone() {
        assert_eq!(truncate_for_push("short", 900), "short");
    }

    #[test]
    fn test_truncate_cuts_on_char_boundary() {
        let text = "é".repeat(1000);
        let truncated = truncate_for_push(&text, 900);
        assert!(truncated.starts_with(&"é".repeat(900)));
        assert!(!truncated.starts_with(&"é".repeat(901)));
        assert!(truncated.ends_with("[Report truncated - see full version in the saved report]"));
    }

    #[test]
    fn test_report_notification_is_cleaned_and_bounded() {
        let report = FinalReport {
            task: Task::new("t").unwrap(),
            report: format!("# Findings\n{}", "x".repeat(2000)),
            worker_results: Vec::new(),
        };
        let n = Notification::report("Research Report Complete", &report);
        assert_eq!(n.title, "Research Report Complete");
        assert!(n.message.starts_with("Findings\nx"));
        assert!(n.message.chars().count() < 1024);
    }

    #[tokio::test]
    async fn test_log_sink_always_delivers() {
        let report = LogSink.deliver(&Notification::new("t", "m")).await;
        assert!(report.is_delivered());
        assert_eq!(report.to_string(), "log: delivered");
    }

    #[tokio::test]
    async fn test_detached_dispatch_returns_report() {
        let handle = dispatch_detached(Arc::new(LogSink), Notification::new("t", "m"));
        assert_eq!(handle.await.unwrap(), DeliveryReport::delivered("log"));
    }

    #[test]
    fn test_sink_from_config_requires_credentials() {
        let mut config = NotificationConfig { sink: SinkKind::Pushover, ..Default::default() };
        assert!(sink_from_config(&config).is_err());

        config.pushover_token = Some("tok".into());
        config.pushover_user = Some("usr".into());
        assert_eq!(sink_from_config(&config).unwrap().name(), "pushover");

        let discord = NotificationConfig { sink: SinkKind::Discord, ..Default::default() };
        assert!(sink_from_config(&discord).is_err());
        assert_eq!(sink_from_config(&NotificationConfig::default()).unwrap().name(), "log");
    }
}
