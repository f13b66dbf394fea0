//! Terminal failures of a delegation run

use thiserror::Error;

use crate::agent::capability::CapabilityError;

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Orchestrator,
    Worker,
    Synthesizer,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Orchestrator => write!(f, "orchestrator"),
            Stage::Worker => write!(f, "worker"),
            Stage::Synthesizer => write!(f, "synthesizer"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("task description is empty")]
    InvalidTask,
    #[error("orchestrator call failed: {0}")]
    Orchestrator(#[source] CapabilityError),
    #[error("could not decompose task: {0}")]
    Decomposition(String),
    #[error("worker for subtask {subtask_id} failed: {source}")]
    Worker {
        subtask_id: u32,
        #[source]
        source: CapabilityError,
    },
    #[error("missing worker results for subtasks {ids:?}")]
    MissingResults { ids: Vec<u32> },
    #[error("unexpected or duplicate worker result for subtask {subtask_id}")]
    UnexpectedResult { subtask_id: u32 },
    #[error("synthesizer call failed: {0}")]
    Synthesizer(#[source] CapabilityError),
}

impl PipelineError {
    /// The stage that failed
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InvalidTask
            | PipelineError::Orchestrator(_)
            | PipelineError::Decomposition(_) => Stage::Orchestrator,
            PipelineError::Worker { .. } => Stage::Worker,
            PipelineError::MissingResults { .. }
            | PipelineError::UnexpectedResult { .. }
            | PipelineError::Synthesizer(_) => Stage::Synthesizer,
        }
    }
}
