//! Result synthesis
//!
//! Merges every worker report back into one final report. Synthesis only
//! starts once each subtask has exactly one result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::agent::capability::{Capability, CapabilityError, CapabilityRequest};
use super::error::PipelineError;
use super::plan::{FinalReport, SubtaskSpec, Task, WorkerResult};

const SYNTHESIZER_SYSTEM_PROMPT: &str = "You lead an analysis carried out by several specialists. \
Merge their reports into one coherent, well-structured final report: integrate every perspective, \
call out conflicts or gaps between them, and finish with overall conclusions and recommendations.";

/// Pair every subtask with its result, in decomposition order.
///
/// Fails if any subtask has no result, or if a result matches no subtask or
/// repeats one.
pub fn check_coverage(
    specs: &[SubtaskSpec],
    results: Vec<WorkerResult>,
) -> Result<Vec<WorkerResult>, PipelineError> {
    let mut by_id: BTreeMap<u32, WorkerResult> = BTreeMap::new();
    for result in results {
        let known = specs.iter().any(|s| s.id == result.subtask_id);
        if !known || by_id.contains_key(&result.subtask_id) {
            return Err(PipelineError::UnexpectedResult { subtask_id: result.subtask_id });
        }
        by_id.insert(result.subtask_id, result);
    }

    let missing: Vec<u32> = specs
        .iter()
        .map(|s| s.id)
        .filter(|id| !by_id.contains_key(id))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::MissingResults { ids: missing });
    }

    Ok(specs.iter().filter_map(|s| by_id.remove(&s.id)).collect())
}

/// Combines worker results into the final report
pub struct Synthesizer {
    capability: Arc<dyn Capability>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl Synthesizer {
    pub fn new(capability: Arc<dyn Capability>, model: impl Into<String>) -> Self {
        Self {
            capability,
            model: model.into(),
            max_tokens: 4096,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_prompt(task: &Task, specs: &[SubtaskSpec], results: &[WorkerResult]) -> String {
        let mut prompt = format!(
            "ORIGINAL TASK: {}\n\nYou received {} specialist reports.\n",
            task.description(),
            results.len()
        );
        for (spec, result) in specs.iter().zip(results) {
            prompt.push_str(&format!(
                "\nWORKER {} - {} ({})\n{}\n\n---\n",
                result.subtask_id,
                result.expertise.as_deref().unwrap_or("general"),
                spec.description,
                result.output.trim()
            ));
        }
        prompt
    }

    /// Produce the final report from a complete result set
    pub async fn synthesize(
        &self,
        task: &Task,
        specs: &[SubtaskSpec],
        results: Vec<WorkerResult>,
    ) -> Result<FinalReport, PipelineError> {
        let results = check_coverage(specs, results)?;
        info!("Synthesizing {} worker reports with {}", results.len(), self.model);

        let request = CapabilityRequest::prompt(&self.model, Self::build_prompt(task, specs, &results))
            .with_system(SYNTHESIZER_SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens);

        let report = match tokio::time::timeout(self.timeout, self.capability.complete(request)).await {
            Ok(reply) => reply.map_err(PipelineError::Synthesizer)?,
            Err(_) => {
                warn!("Synthesizer timed out after {:?}", self.timeout);
                return Err(PipelineError::Synthesizer(CapabilityError::Timeout(self.timeout)));
            }
        };
        if report.trim().is_empty() {
            return Err(PipelineError::Synthesizer(CapabilityError::EmptyResponse));
        }

        Ok(FinalReport {
            task: task.clone(),
            report,
            worker_results: results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::capability::MockCapability;

    struct Stalled;

    #[async_trait::async_trait]
    impl Capability for Stalled {
        async fn complete(&self, _: CapabilityRequest) -> Result<String, CapabilityError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }
    }

    fn spec(id: u32) -> SubtaskSpec {
        SubtaskSpec { id, description: format!("dimension {}", id), expertise: None, output_format: None }
    }

    fn result(id: u32) -> WorkerResult {
        WorkerResult {
            subtask_id: id,
            expertise: Some(format!("expert {}", id)),
            model: "m".into(),
            output: format!("finding {}", id),
            duration_secs: 0.1,
        }
    }

    #[test]
    fn test_coverage_reorders_to_spec_order() {
        let ordered = check_coverage(&[spec(1), spec(2)], vec![result(2), result(1)]).unwrap();
        assert_eq!(ordered[0].subtask_id, 1);
        assert_eq!(ordered[1].subtask_id, 2);
    }

    #[test]
    fn test_coverage_reports_every_missing_id() {
        let err = check_coverage(&[spec(1), spec(2), spec(3)], vec![result(2)]).unwrap_err();
        match err {
            PipelineError::MissingResults { ids } => assert_eq!(ids, vec![1, 3]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_coverage_rejects_duplicates_and_strangers() {
        assert!(matches!(
            check_coverage(&[spec(1)], vec![result(1), result(1)]),
            Err(PipelineError::UnexpectedResult { subtask_id: 1 })
        ));
        assert!(matches!(
            check_coverage(&[spec(1)], vec![result(1), result(9)]),
            Err(PipelineError::UnexpectedResult { subtask_id: 9 })
        ));
    }

    #[tokio::test]
    async fn test_missing_result_never_calls_capability() {
        let mut mock = MockCapability::new();
        mock.expect_complete().times(0);
        let synthesizer = Synthesizer::new(Arc::new(mock), "writer");
        let task = Task::new("Analyze X").unwrap();

        let err = synthesizer.synthesize(&task, &[spec(1), spec(2)], vec![result(1)]).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingResults { .. }));
    }

    #[tokio::test]
    async fn test_slow_synthesis_times_out() {
        let synthesizer = Synthesizer::new(Arc::new(Stalled), "writer")
            .with_timeout(Duration::from_millis(20));
        let task = Task::new("Analyze X").unwrap();

        let err = synthesizer.synthesize(&task, &[spec(1)], vec![result(1)]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Synthesizer(CapabilityError::Timeout(_))));
        assert_eq!(err.stage(), super::super::error::Stage::Synthesizer);
    }

    #[tokio::test]
    async fn test_prompt_includes_every_worker_report() {
        let mut mock = MockCapability::new();
        mock.expect_complete()
            .withf(|req| {
                let p = req.last_prompt();
                req.model == "writer"
                    && p.contains("ORIGINAL TASK: Analyze X")
                    && p.contains("finding 1")
                    && p.contains("finding 2")
            })
            .times(1)
            .returning(|_| Ok("combined".to_string()));
        let synthesizer = Synthesizer::new(Arc::new(mock), "writer");
        let task = Task::new("Analyze X").unwrap();

        let report = synthesizer.synthesize(&task, &[spec(1), spec(2)], vec![result(2), result(1)]).await.unwrap();
        assert_eq!(report.report, "combined");
        assert_eq!(report.worker_results.len(), 2);
    }
}
