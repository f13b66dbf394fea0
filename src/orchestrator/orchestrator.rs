//! Task orchestrator
//!
//! Asks the configured planning model to break one task into a small set of
//! independent subtasks, returned as a strict JSON record.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::agent::capability::{Capability, CapabilityError, CapabilityRequest};
use super::error::PipelineError;
use super::plan::{parse_decomposition, SubtaskSpec, Task};

const ORCHESTRATOR_SYSTEM_PROMPT: &str = r#"You are a project lead who splits complex analysis work into independent pieces for specialists.

Split the task into 3-4 focused subtasks that different specialists can complete without talking to each other.
For every subtask give the concrete question to answer, the kind of specialist needed and the shape of the expected output.

Respond with JSON only, no prose and no markdown:
{"subtasks": [{"description": "<question or analysis>", "expertise_required": "<specialist>", "output_format": "<format>"}]}"#;

/// Decomposes a task into subtasks
pub struct Orchestrator {
    capability: Arc<dyn Capability>,
    model: String,
    max_subtasks: usize,
    max_tokens: u32,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(capability: Arc<dyn Capability>, model: impl Into<String>) -> Self {
        Self {
            capability,
            model: model.into(),
            max_subtasks: 4,
            max_tokens: 2048,
            timeout: Duration::from_secs(300),
        }
    }

    /// Cap on the number of subtasks kept from one decomposition
    pub fn with_max_subtasks(mut self, max_subtasks: usize) -> Self {
        self.max_subtasks = max_subtasks.max(1);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Break the task into between 1 and `max_subtasks` subtasks
    pub async fn decompose(&self, task: &Task) -> Result<Vec<SubtaskSpec>, PipelineError> {
        info!("Orchestrator decomposing task with model {}", self.model);

        let request = CapabilityRequest::prompt(&self.model, format!("TASK: {}", task.description()))
            .with_system(ORCHESTRATOR_SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens);

        let response = match tokio::time::timeout(self.timeout, self.capability.complete(request)).await {
            Ok(reply) => reply.map_err(PipelineError::Orchestrator)?,
            Err(_) => {
                warn!("Orchestrator timed out after {:?}", self.timeout);
                return Err(PipelineError::Orchestrator(CapabilityError::Timeout(self.timeout)));
            }
        };
        debug!("Orchestrator response: {}", response);

        let subtasks = parse_decomposition(&response, self.max_subtasks)?;
        info!("Orchestrator identified {} subtasks", subtasks.len());
        for subtask in &subtasks {
            debug!(
                "Subtask {} [{}]: {}",
                subtask.id,
                subtask.expertise.as_deref().unwrap_or("general"),
                subtask.description
            );
        }
        Ok(subtasks)
    }
}
