//! Worker invocation
//!
//! Each subtask is sent independently to one backing model. Workers share
//! nothing but the read-only router and capability handle, so the pool can
//! fan them all out at once and join on the full set.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::agent::capability::{Capability, CapabilityError, CapabilityRequest};
use crate::config::ModelsConfig;
use super::error::PipelineError;
use super::plan::{SubtaskSpec, WorkerResult};

/// Chooses the backing model for a subtask.
///
/// Precedence: expertise keyword match, then the positional roster, then the
/// default worker model.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    default_model: String,
    roster: Vec<String>,
    /// (lower-cased keyword, model)
    expertise: Vec<(String, String)>,
}

impl ModelRouter {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
            roster: Vec::new(),
            expertise: Vec::new(),
        }
    }

    pub fn from_models(models: &ModelsConfig) -> Self {
        Self::new(models.worker.clone())
            .with_roster(models.workers.clone())
            .with_expertise(models.expertise.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    pub fn with_roster(mut self, roster: Vec<String>) -> Self {
        self.roster = roster;
        self
    }

    pub fn with_expertise(mut self, mapping: impl IntoIterator<Item = (String, String)>) -> Self {
        self.expertise = mapping
            .into_iter()
            .map(|(keyword, model)| (keyword.trim().to_lowercase(), model))
            .filter(|(keyword, _)| !keyword.is_empty())
            .collect();
        self
    }

    /// Model identity for one subtask
    pub fn route(&self, spec: &SubtaskSpec) -> &str {
        if let Some(expertise) = &spec.expertise {
            let expertise = expertise.to_lowercase();
            if let Some((_, model)) = self.expertise.iter().find(|(kw, _)| expertise.contains(kw.as_str())) {
                return model;
            }
        }

        let position = (spec.id as usize).checked_sub(1);
        position
            .and_then(|idx| self.roster.get(idx))
            .map(|s| s.as_str())
            .unwrap_or(&self.default_model)
    }
}

/// Executes exactly one subtask
pub struct Worker {
    capability: Arc<dyn Capability>,
    router: ModelRouter,
    timeout: Duration,
    max_tokens: u32,
}

impl Worker {
    pub fn new(capability: Arc<dyn Capability>, router: ModelRouter) -> Self {
        Self {
            capability,
            router,
            timeout: Duration::from_secs(120),
            max_tokens: 2048,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    fn build_prompt(spec: &SubtaskSpec) -> (String, String) {
        let specialist = spec.expertise.as_deref().unwrap_or("general analysis");
        let system = format!(
            "You are a specialist in {}. Stay inside your area of expertise and give a thorough, well-reasoned answer.",
            specialist
        );
        let mut prompt = format!("Your task: {}", spec.description);
        if let Some(format) = &spec.output_format {
            prompt.push_str(&format!("\n\nPresent your analysis as: {}", format));
        }
        (system, prompt)
    }

    /// Run one subtask; a timeout counts as a failed worker
    pub async fn run(&self, spec: &SubtaskSpec) -> Result<WorkerResult, PipelineError> {
        let model = self.router.route(spec).to_string();
        let (system, prompt) = Self::build_prompt(spec);
        let request = CapabilityRequest::prompt(&model, prompt)
            .with_system(system)
            .with_max_tokens(self.max_tokens);

        info!("Worker {} running on {}", spec.id, model);
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.capability.complete(request)).await;
        let duration_secs = start.elapsed().as_secs_f64();

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                warn!("Worker {} failed after {:.1}s: {}", spec.id, duration_secs, source);
                return Err(PipelineError::Worker { subtask_id: spec.id, source });
            }
            Err(_) => {
                warn!("Worker {} timed out after {:?}", spec.id, self.timeout);
                return Err(PipelineError::Worker {
                    subtask_id: spec.id,
                    source: CapabilityError::Timeout(self.timeout),
                });
            }
        };

        Ok(WorkerResult {
            subtask_id: spec.id,
            expertise: spec.expertise.clone(),
            model,
            output,
            duration_secs,
        })
    }
}

/// Fans subtasks out to workers and joins on all of them
pub struct WorkerPool {
    worker: Worker,
    max_concurrency: Option<usize>,
}

impl WorkerPool {
    pub fn new(worker: Worker) -> Self {
        Self { worker, max_concurrency: None }
    }

    /// Bound the number of in-flight workers
    pub fn with_max_concurrency(mut self, max_concurrency: Option<usize>) -> Self {
        self.max_concurrency = max_concurrency.map(|n| n.max(1));
        self
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// Run every subtask. Fails as soon as any worker fails; on success the
    /// results are ordered by subtask id.
    pub async fn run_all(&self, specs: &[SubtaskSpec]) -> Result<Vec<WorkerResult>, PipelineError> {
        let limit = self.max_concurrency.unwrap_or(specs.len()).max(1);
        info!("Dispatching {} workers ({} at a time)", specs.len(), limit);

        let mut results: Vec<WorkerResult> = stream::iter(specs.iter().map(|spec| self.worker.run(spec)))
            .buffer_unordered(limit)
            .try_collect()
            .await?;

        results.sort_by_key(|r| r.subtask_id);
        Ok(results)
    }
}
