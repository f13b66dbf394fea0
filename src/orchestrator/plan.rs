//! Data model of one delegation run: the task, its decomposition into
//! subtasks, the per-subtask worker results and the final report.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::PipelineError;

/// A text description of the work to perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    description: String,
}

impl Task {
    /// Create a task; blank descriptions are rejected
    pub fn new(description: impl Into<String>) -> Result<Self, PipelineError> {
        let description = description.into().trim().to_string();
        if description.is_empty() {
            return Err(PipelineError::InvalidTask);
        }
        Ok(Self { description })
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// One entry of the orchestrator's decomposition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskSpec {
    /// 1-based sequence position
    pub id: u32,
    pub description: String,
    /// Suggested specialist (e.g. "safety", "economic")
    #[serde(default)]
    pub expertise: Option<String>,
    #[serde(default)]
    pub output_format: Option<String>,
}

/// Text produced by a worker for one subtask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub subtask_id: u32,
    pub expertise: Option<String>,
    /// Model identity that produced the output
    pub model: String,
    pub output: String,
    pub duration_secs: f64,
}

/// Synthesizer output plus the results it was derived from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub task: Task,
    pub report: String,
    /// Kept for traceability, not re-validated
    pub worker_results: Vec<WorkerResult>,
}

impl FinalReport {
    /// Render the report with a worker appendix
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(self.report.trim_end());
        out.push_str("\n\n---\n\n## Worker contributions\n\n");
        for result in &self.worker_results {
            out.push_str(&format!(
                "- Subtask {} ({}): {} in {:.1}s\n",
                result.subtask_id,
                result.expertise.as_deref().unwrap_or("general"),
                result.model,
                result.duration_secs,
            ));
        }
        out
    }
}

#[derive(Debug, Deserialize)]
struct RawDecomposition {
    subtasks: Vec<RawSubtask>,
}

#[derive(Debug, Deserialize)]
struct RawSubtask {
    description: String,
    #[serde(default, alias = "expertise")]
    expertise_required: Option<String>,
    #[serde(default)]
    output_format: Option<String>,
}

/// Pull JSON out of a ``` or ```json fence, if the reply has one.
///
/// Text before the opening fence and after the closing one is dropped; a
/// reply that already starts with `{` is left alone.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let rest = trimmed[start + 3..].trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let body = match rest.rfind("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    body.trim()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse the orchestrator's structured decomposition.
///
/// Identifiers are assigned by sequence position; at most `max_subtasks`
/// entries are kept.
pub fn parse_decomposition(text: &str, max_subtasks: usize) -> Result<Vec<SubtaskSpec>, PipelineError> {
    let raw: RawDecomposition = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| PipelineError::Decomposition(format!("invalid subtask JSON: {}", e)))?;

    if raw.subtasks.is_empty() {
        return Err(PipelineError::Decomposition("orchestrator returned no subtasks".to_string()));
    }

    let max_subtasks = max_subtasks.max(1);
    if raw.subtasks.len() > max_subtasks {
        warn!(
            "Orchestrator returned {} subtasks, keeping the first {}",
            raw.subtasks.len(),
            max_subtasks
        );
    }

    raw.subtasks
        .into_iter()
        .take(max_subtasks)
        .enumerate()
        .map(|(idx, subtask)| {
            let description = subtask.description.trim().to_string();
            if description.is_empty() {
                return Err(PipelineError::Decomposition(format!(
                    "subtask {} has an empty description",
                    idx + 1
                )));
            }
            Ok(SubtaskSpec {
                id: idx as u32 + 1,
                description,
                expertise: non_blank(subtask.expertise_required),
                output_format: non_blank(subtask.output_format),
            })
        })
        .collect()
}
