//! Delegation pipeline
//!
//! Orchestrator -> workers -> synthesizer, run once per task. Control flows
//! one way; the only synchronization point is the join before synthesis.
//! Any stage failure ends the run with a single error naming the stage.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::agent::capability::Capability;
use crate::config::Config;
use super::error::PipelineError;
use super::orchestrator::Orchestrator;
use super::plan::{FinalReport, Task};
use super::synthesizer::Synthesizer;
use super::worker::{ModelRouter, Worker, WorkerPool};

/// Progress notifications emitted while a run advances
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineProgress {
    Decomposed { subtasks: usize },
    WorkersFinished { results: usize },
    Synthesizing,
    Completed,
}

pub type ProgressCallback = Arc<dyn Fn(PipelineProgress) + Send + Sync>;

pub struct DelegationPipeline {
    orchestrator: Orchestrator,
    workers: WorkerPool,
    synthesizer: Synthesizer,
    on_progress: Option<ProgressCallback>,
}

impl DelegationPipeline {
    pub fn new(orchestrator: Orchestrator, workers: WorkerPool, synthesizer: Synthesizer) -> Self {
        Self {
            orchestrator,
            workers,
            synthesizer,
            on_progress: None,
        }
    }

    /// Wire every stage to one capability using the configured models and limits
    pub fn from_config(config: &Config, capability: Arc<dyn Capability>) -> Self {
        let limits = &config.pipeline;
        let call_timeout = Duration::from_secs(limits.call_timeout_secs);

        let orchestrator = Orchestrator::new(capability.clone(), config.models.orchestrator.clone())
            .with_max_subtasks(limits.max_subtasks)
            .with_max_tokens(limits.max_tokens)
            .with_timeout(call_timeout);

        let worker = Worker::new(capability.clone(), ModelRouter::from_models(&config.models))
            .with_timeout(Duration::from_secs(limits.worker_timeout_secs))
            .with_max_tokens(limits.max_tokens);
        let workers = WorkerPool::new(worker).with_max_concurrency(limits.max_concurrency);

        let synthesizer = Synthesizer::new(capability, config.models.synthesizer.clone())
            .with_max_tokens(limits.max_tokens.saturating_mul(2))
            .with_timeout(call_timeout);

        Self::new(orchestrator, workers, synthesizer)
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    fn emit(&self, progress: PipelineProgress) {
        if let Some(callback) = &self.on_progress {
            callback(progress);
        }
    }

    /// Run the full pipeline for one task description
    pub async fn run(&self, description: &str) -> Result<FinalReport, PipelineError> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("delegation", run_id = %&run_id[..8]);

        let outcome = async {
            let task = Task::new(description)?;
            self.run_task(&task).await
        }
        .instrument(span)
        .await;

        if let Err(e) = &outcome {
            error!(run_id = %run_id, stage = %e.stage(), "Delegation run failed: {}", e);
        }
        outcome
    }

    /// Run the full pipeline for an already validated task
    pub async fn run_task(&self, task: &Task) -> Result<FinalReport, PipelineError> {
        info!("Starting delegation run");

        let subtasks = self.orchestrator.decompose(task).await?;
        self.emit(PipelineProgress::Decomposed { subtasks: subtasks.len() });

        let results = self.workers.run_all(&subtasks).await?;
        self.emit(PipelineProgress::WorkersFinished { results: results.len() });

        self.emit(PipelineProgress::Synthesizing);
        let report = self.synthesizer.synthesize(task, &subtasks, results).await?;

        self.emit(PipelineProgress::Completed);
        info!("Delegation run completed ({} worker reports)", report.worker_results.len());
        Ok(report)
    }
}
