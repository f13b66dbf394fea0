//! CLI interface for agent-workflows

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::capability::Capability;
use crate::agent::clarify::{ClarificationAgent, ClarifyOutcome, InputKind};
use crate::agent::llm::OpenRouterClient;
use crate::config::{Config, ModelsConfig};
use crate::memory::{SessionContext, SessionStore, SqliteSessionStore};
use crate::notifications::{self, DeliveryStatus, Notification};
use crate::orchestrator::{DelegationPipeline, FinalReport, PipelineProgress};

#[derive(Parser)]
#[command(name = "agent-workflows")]
#[command(about = "Delegate analysis tasks to a team of LLM workers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose a task, run the workers and synthesize a report
    Run {
        /// Task description
        task: String,
        /// Send a notification when the report is ready
        #[arg(short, long)]
        notify: bool,
        /// Write the report (markdown) to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Clarify a research query interactively
    Chat {
        /// Continue an existing session
        #[arg(short, long)]
        session: Option<String>,
        /// Hand the final answer to the delegation pipeline
        #[arg(short, long)]
        research: bool,
    },
    /// List stored chat sessions
    Sessions {
        /// Delete every turn of this session
        #[arg(long, value_name = "ID")]
        clear: Option<String>,
    },
    /// Send a message through the configured notification sink
    Notify {
        message: String,
    },
    /// Configure the agent
    Config {
        /// Set OpenRouter API key
        #[arg(long)]
        set_api_key: Option<String>,
        /// Remove the stored API key from the keyring and fallback file
        #[arg(long, conflicts_with = "set_api_key")]
        delete_api_key: bool,
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Set model for a role (usage: --set-model role model_id)
        #[arg(long, value_names = &["role", "model"], num_args = 2)]
        set_model: Option<Vec<String>>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { task, notify, output } => {
            let config = Config::load()?;
            let capability = capability_from_config(&config)?;
            let report = run_pipeline(&config, capability, &task).await?;
            finish_report(&config, &report, notify, output.as_deref()).await?;
        }
        Commands::Chat { session, research } => {
            let config = Config::load()?;
            run_chat(&config, session, research).await?;
        }
        Commands::Sessions { clear } => {
            let config = Config::load()?;
            let store = open_store(&config).await?;
            match clear {
                Some(id) => {
                    store.clear(&id).await?;
                    println!("Cleared session {}", id);
                }
                None => list_sessions(&store).await?,
            }
        }
        Commands::Notify { message } => {
            let config = Config::load()?;
            let sink = notifications::sink_from_config(&config.notifications)?;
            let text = notifications::truncate_for_push(&message, notifications::PUSH_MESSAGE_LIMIT);
            let report = sink.deliver(&Notification::new(&config.notifications.title, text)).await;
            println!("{}", report);
            if let DeliveryStatus::Failed { diagnostic } = report.status {
                anyhow::bail!("Notification not delivered: {}", diagnostic);
            }
        }
        Commands::Config { set_api_key, delete_api_key, show, set_model } => {
            if let Some(key) = set_api_key {
                crate::security::set_api_key(&key)?;
                println!("OpenRouter API key stored securely in keyring.");
            } else if delete_api_key {
                crate::security::delete_api_key()?;
                println!("Stored API key removed.");
            } else if let Some(args) = set_model {
                crate::config::set_model(&args[0], &args[1])?;
            } else if show {
                crate::config::show_config()?;
            } else {
                println!("Configuration options:");
                println!("  --set-api-key <key>      Set your OpenRouter API key");
                println!("  --delete-api-key         Remove the stored API key");
                println!("  --show                   Display current configuration");
                println!("  --set-model <role> <id>  Set model for a role");
                println!("\nAvailable roles: {}", ModelsConfig::roles().join(", "));
                println!("Config file: {}", crate::config::config_path()?.display());
            }
        }
    }

    Ok(())
}

fn capability_from_config(config: &Config) -> Result<Arc<dyn Capability>> {
    let client = OpenRouterClient::from_config(config)
        .context("No API key found. Run: agent-workflows config --set-api-key YOUR_KEY")?;
    Ok(Arc::new(client))
}

async fn open_store(config: &Config) -> Result<Arc<dyn SessionStore>> {
    let path = config.session.resolve_db_path()?;
    Ok(Arc::new(SqliteSessionStore::open(&path).await?))
}

fn print_progress(progress: PipelineProgress) {
    match progress {
        PipelineProgress::Decomposed { subtasks } => eprintln!("Orchestrator identified {} subtasks", subtasks),
        PipelineProgress::WorkersFinished { results } => eprintln!("{} workers finished", results),
        PipelineProgress::Synthesizing => eprintln!("Synthesizing final report..."),
        PipelineProgress::Completed => eprintln!("Done."),
    }
}

async fn run_pipeline(config: &Config, capability: Arc<dyn Capability>, task: &str) -> Result<FinalReport> {
    let pipeline = DelegationPipeline::from_config(config, capability)
        .with_progress(Arc::new(print_progress));
    pipeline
        .run(task)
        .await
        .map_err(|e| anyhow::anyhow!("{} stage failed: {}", e.stage(), e))
}

/// Print, save and announce a finished report. Notification failures are
/// reported but never fail the command.
async fn finish_report(config: &Config, report: &FinalReport, notify: bool, output: Option<&std::path::Path>) -> Result<()> {
    println!("{}", report.to_markdown());

    if let Some(path) = output {
        std::fs::write(path, report.to_markdown())
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        eprintln!("Report saved to {}", path.display());
    }

    if notify {
        match notifications::sink_from_config(&config.notifications) {
            Ok(sink) => {
                let notification = Notification::report(&config.notifications.title, report);
                match notifications::dispatch_detached(sink, notification).await {
                    Ok(delivery) => eprintln!("Notification {}", delivery),
                    Err(e) => eprintln!("Notification task aborted: {}", e),
                }
            }
            Err(e) => eprintln!("Notification skipped: {:#}", e),
        }
    }
    Ok(())
}

async fn list_sessions(store: &Arc<dyn SessionStore>) -> Result<()> {
    let sessions = store.sessions().await?;
    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!("Sessions:\n");
    for (i, s) in sessions.iter().enumerate() {
        println!(
            "{}. {} ({} turns, last active {})",
            i + 1,
            s.session_id,
            s.turns,
            s.last_activity.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

async fn run_chat(config: &Config, session_id: Option<String>, research: bool) -> Result<()> {
    let capability = capability_from_config(config)?;
    let store = open_store(config).await?;
    let mut session = match session_id {
        Some(id) => SessionContext::new(id, store.clone()),
        None => SessionContext::fresh(store.clone()),
    };
    let agent = ClarificationAgent::new(capability.clone(), config.models.chat.clone())
        .with_max_follow_ups(config.clarify.max_follow_ups)
        .with_max_tokens(config.pipeline.max_tokens);

    println!("Session: {}", session.session_id);
    println!("Describe what you want researched. Commands: 'new', 'history', 'exit'.\n");

    let mut rl = rustyline::DefaultEditor::new()?;
    let mut awaiting_clarification = agent.awaiting_clarification(&session).await?;
    if awaiting_clarification {
        println!("This session is waiting for answers to earlier questions.\n");
    }

    loop {
        let line = match rl.readline("> ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted | rustyline::error::ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(input);

        match input {
            "exit" | "quit" => break,
            "new" => {
                session = SessionContext::fresh(store.clone());
                awaiting_clarification = false;
                println!("Started session {}\n", session.session_id);
                continue;
            }
            "history" => {
                for turn in session.history().await? {
                    println!("[{}] {}", turn.role, turn.content);
                }
                println!();
                continue;
            }
            _ => {}
        }

        let kind = if awaiting_clarification { InputKind::Clarification } else { InputKind::Query };
        match agent.turn(&session, kind, input).await {
            Ok(ClarifyOutcome::FollowUp(questions)) => {
                awaiting_clarification = true;
                println!("\nA few questions first:");
                for (i, q) in questions.iter().enumerate() {
                    println!("  {}. {}", i + 1, q);
                }
                println!();
            }
            Ok(ClarifyOutcome::Answer(content)) => {
                awaiting_clarification = false;
                println!("\n{}\n", content);
                if research {
                    match run_pipeline(config, capability.clone(), &content).await {
                        Ok(report) => finish_report(config, &report, false, None).await?,
                        Err(e) => eprintln!("Error: {:#}\n", e),
                    }
                }
            }
            Err(e) => eprintln!("Error: {}\n", e),
        }
    }

    println!("Goodbye!");
    Ok(())
}
