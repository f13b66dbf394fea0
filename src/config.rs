//! Configuration management
//!
//! Manages provider settings, model assignments, pipeline limits,
//! notification sinks and session storage.

use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::notifications::pushover::PUSHOVER_API_URL;

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// LLM provider settings
    #[serde(default)]
    pub provider: ProviderSettings,
    /// Model assignments for the pipeline roles
    #[serde(default)]
    pub models: ModelsConfig,
    /// Delegation pipeline limits
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Notification sink selection and credentials
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Clarification chat settings
    #[serde(default)]
    pub clarify: ClarifyConfig,
    /// Session history storage
    #[serde(default)]
    pub session: SessionConfig,
}

/// OpenAI-compatible provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Base URL for chat completions (e.g., "https://openrouter.ai/api/v1")
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable checked for the API key before the keyring
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_base_url() -> String {
    OPENROUTER_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    crate::security::keyring::API_KEY_ENV.to_string()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

/// Model assignments for the pipeline roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Model that decomposes a task into subtasks
    #[serde(default = "default_orchestrator_model")]
    pub orchestrator: String,
    /// Model that merges worker results into the final report
    #[serde(default = "default_synthesizer_model")]
    pub synthesizer: String,
    /// Fallback worker model
    #[serde(default = "default_worker_model")]
    pub worker: String,
    /// Positional worker roster: subtask 1 uses `workers[0]`, and so on
    #[serde(default = "default_worker_roster")]
    pub workers: Vec<String>,
    /// Expertise keyword -> model; takes precedence over the roster
    #[serde(default)]
    pub expertise: BTreeMap<String, String>,
    /// Model for the clarification chat
    #[serde(default = "default_chat_model")]
    pub chat: String,
}

fn default_orchestrator_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_synthesizer_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_worker_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_worker_roster() -> Vec<String> {
    vec![
        "anthropic/claude-3.7-sonnet".to_string(),
        "openai/gpt-4o-mini".to_string(),
        "google/gemini-2.0-flash-001".to_string(),
        "deepseek/deepseek-chat".to_string(),
    ]
}

fn default_chat_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            orchestrator: default_orchestrator_model(),
            synthesizer: default_synthesizer_model(),
            worker: default_worker_model(),
            workers: default_worker_roster(),
            expertise: BTreeMap::new(),
            chat: default_chat_model(),
        }
    }
}

impl ModelsConfig {
    /// Get model for a role name
    pub fn get(&self, role: &str) -> Option<&str> {
        match role.to_lowercase().as_str() {
            "orchestrator" | "planner" => Some(&self.orchestrator),
            "synthesizer" | "writer" => Some(&self.synthesizer),
            "worker" => Some(&self.worker),
            "chat" => Some(&self.chat),
            _ => None,
        }
    }

    /// Set model for a role name
    pub fn set(&mut self, role: &str, model: String) -> bool {
        match role.to_lowercase().as_str() {
            "orchestrator" | "planner" => { self.orchestrator = model; true }
            "synthesizer" | "writer" => { self.synthesizer = model; true }
            "worker" => { self.worker = model; true }
            "chat" => { self.chat = model; true }
            _ => false,
        }
    }

    /// List all assignable roles
    pub fn roles() -> &'static [&'static str] {
        &["orchestrator", "synthesizer", "worker", "chat"]
    }
}

/// Limits for one delegation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum subtasks kept from one decomposition
    #[serde(default = "default_max_subtasks")]
    pub max_subtasks: usize,
    /// Timeout for a single worker call in seconds
    #[serde(default = "default_worker_timeout")]
    pub worker_timeout_secs: u64,
    /// Timeout for the orchestrator and synthesizer calls in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// Upper bound on in-flight workers; unset runs all at once
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Max tokens requested per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_subtasks() -> usize { 4 }
fn default_worker_timeout() -> u64 { 120 }
fn default_call_timeout() -> u64 { 300 }
fn default_max_tokens() -> u32 { 2048 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_subtasks: default_max_subtasks(),
            worker_timeout_secs: default_worker_timeout(),
            call_timeout_secs: default_call_timeout(),
            max_concurrency: None,
            max_tokens: default_max_tokens(),
        }
    }
}

/// Which sink delivers notifications
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Pushover,
    Discord,
    #[default]
    Log,
}

impl std::str::FromStr for SinkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pushover" => Ok(SinkKind::Pushover),
            "discord" => Ok(SinkKind::Discord),
            "log" => Ok(SinkKind::Log),
            other => anyhow::bail!("Unknown notification sink '{}' (expected pushover, discord or log)", other),
        }
    }
}

/// Notification sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub sink: SinkKind,
    /// Pushover application token
    #[serde(default)]
    pub pushover_token: Option<String>,
    /// Pushover user/recipient key
    #[serde(default)]
    pub pushover_user: Option<String>,
    #[serde(default = "default_pushover_url")]
    pub pushover_url: String,
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
    /// Title attached to report notifications
    #[serde(default = "default_notification_title")]
    pub title: String,
}

fn default_pushover_url() -> String {
    PUSHOVER_API_URL.to_string()
}

fn default_notification_title() -> String {
    "Research Report Complete".to_string()
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            pushover_token: None,
            pushover_user: None,
            pushover_url: default_pushover_url(),
            discord_webhook_url: None,
            title: default_notification_title(),
        }
    }
}

impl NotificationConfig {
    /// Apply `PUSHOVER_TOKEN`, `PUSHOVER_USER`, `DISCORD_WEBHOOK_URL`
    /// and `AGENT_WORKFLOWS_SINK` on top of the file values
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(token) = std::env::var("PUSHOVER_TOKEN") {
            self.pushover_token = Some(token);
        }
        if let Ok(user) = std::env::var("PUSHOVER_USER") {
            self.pushover_user = Some(user);
        }
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            self.discord_webhook_url = Some(url);
        }
        if let Ok(sink) = std::env::var("AGENT_WORKFLOWS_SINK") {
            self.sink = sink.parse()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarifyConfig {
    /// Follow-up rounds allowed before the agent must answer
    #[serde(default = "default_max_follow_ups")]
    pub max_follow_ups: usize,
}

fn default_max_follow_ups() -> usize { 2 }

impl Default for ClarifyConfig {
    fn default() -> Self {
        Self { max_follow_ups: default_max_follow_ups() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// SQLite file for chat sessions (defaults to the data dir)
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl SessionConfig {
    /// Resolve the session database path
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("sessions.db")),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing,
    /// with environment overrides applied
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.notifications.apply_env()?;
        Ok(config)
    }

    /// File contents only; used when the config is written back
    fn load_file() -> Result<Self> {
        let config_path = config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config file")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "agent-workflows", "agent-workflows")
        .context("Failed to get project directories")
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// Show current configuration
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Model Assignments:");
    println!("  orchestrator:    {}", config.models.orchestrator);
    println!("  synthesizer:     {}", config.models.synthesizer);
    println!("  worker:          {}", config.models.worker);
    println!("  chat:            {}", config.models.chat);
    for (i, model) in config.models.workers.iter().enumerate() {
        println!("  worker #{:<8} {}", i + 1, model);
    }
    for (keyword, model) in &config.models.expertise {
        println!("  expertise '{}': {}", keyword, model);
    }

    println!("\nPipeline:");
    println!("  max subtasks:    {}", config.pipeline.max_subtasks);
    println!("  worker timeout:  {}s", config.pipeline.worker_timeout_secs);
    println!("  call timeout:    {}s", config.pipeline.call_timeout_secs);
    println!("  concurrency:     {}", config.pipeline.max_concurrency
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unbounded".to_string()));

    println!("\nNotifications: {:?}", config.notifications.sink);
    println!("Provider: {}", config.provider.base_url);
    println!("\nUse 'agent-workflows config --set-model <role> <model>' to change a model");
    println!("   Available roles: {}", ModelsConfig::roles().join(", "));

    Ok(())
}

/// Set model for a specific role
pub fn set_model(role: &str, model: &str) -> Result<()> {
    let mut config = Config::load_file()?;

    if !config.models.set(role, model.to_string()) {
        anyhow::bail!("Unknown role '{}'. Available roles: {}", role, ModelsConfig::roles().join(", "));
    }

    config.save()?;
    println!("Model for '{}' set to: {}", role, model);
    Ok(())
}
