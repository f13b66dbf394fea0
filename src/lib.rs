//! Agent Workflows - multi-agent delegation library
//!
//! - Orchestrator-workers pipeline: one model decomposes a task, worker
//!   models handle the subtasks concurrently, a synthesizer merges them
//! - OpenRouter (or any OpenAI-compatible) chat completion client
//! - Clarification chat sessions persisted in SQLite
//! - Pushover and Discord notifications for finished reports
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use agent_workflows::{Config, DelegationPipeline, OpenRouterClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let client = OpenRouterClient::from_config(&config)?;
//!     let pipeline = DelegationPipeline::from_config(&config, Arc::new(client));
//!     let report = pipeline.run("Analyze the impact of remote work on city centres").await?;
//!     println!("{}", report.to_markdown());
//!     Ok(())
//! }
//! ```

// Core modules
pub mod types;
pub mod config;
pub mod security;
pub mod memory;
pub mod agent;
pub mod orchestrator;
pub mod notifications;
pub mod cli;

// Re-export commonly used types for convenience
pub use agent::{
    capability::{Capability, CapabilityError, CapabilityRequest},
    clarify::{ClarificationAgent, ClarifyOutcome, InputKind},
    llm::OpenRouterClient,
};

pub use memory::{
    InMemorySessionStore,
    SessionContext,
    SessionStore,
    SqliteSessionStore,
};

pub use config::Config;

pub use security::{
    set_api_key,
    delete_api_key,
};

pub use orchestrator::{
    DelegationPipeline,
    FinalReport,
    PipelineError,
    Stage,
};

pub use notifications::{
    DeliveryReport,
    DeliveryStatus,
    Notification,
    NotificationSink,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Multi-agent delegation workflows", NAME, VERSION)
}

/// Shorten `s` to at most `max_chars` characters for log and error output
pub fn truncate_safe(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_safe_respects_char_boundaries() {
        assert_eq!(truncate_safe("héllo", 2), "hé");
        assert_eq!(truncate_safe("short", 50), "short");
        assert_eq!(truncate_safe("", 3), "");
    }

    #[test]
    fn test_info_names_crate() {
        assert!(info().starts_with("agent_workflows v"));
    }
}
