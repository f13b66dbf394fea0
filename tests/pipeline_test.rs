//! End-to-end runs of the delegation pipeline against a scripted model

mod common;

use agent_workflows::config::Config;
use agent_workflows::orchestrator::{
    DelegationPipeline, ModelRouter, Orchestrator, PipelineError, Stage, Synthesizer, Worker, WorkerPool,
};
use common::ScriptedCapability;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_three_subtasks_produce_one_report() -> anyhow::Result<()> {
    let capability = Arc::new(ScriptedCapability::with_subtasks(&["A", "B", "C"]));
    let pipeline = DelegationPipeline::from_config(&Config::default(), capability.clone());

    let report = pipeline.run("Analyze X").await?;

    assert_eq!(report.task.description(), "Analyze X");
    let ids: Vec<u32> = report.worker_results.iter().map(|r| r.subtask_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    for (result, name) in report.worker_results.iter().zip(["A", "B", "C"]) {
        assert_eq!(result.output, format!("analysis of {}", name));
        assert!(report.report.contains(&result.output));
    }
    assert!(report.report.contains("ORIGINAL TASK: Analyze X"));
    assert_eq!(capability.synthesizer_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_workers_follow_the_roster() -> anyhow::Result<()> {
    let capability = Arc::new(ScriptedCapability::with_subtasks(&["A", "B", "C", "D"]));
    let config = Config::default();
    DelegationPipeline::from_config(&config, capability.clone()).run("Analyze X").await?;

    let mut models = capability.worker_models();
    models.sort();
    let mut roster = config.models.workers.clone();
    roster.sort();
    assert_eq!(models, roster);
    Ok(())
}

#[tokio::test]
async fn test_failed_worker_means_no_report() {
    let capability = Arc::new(ScriptedCapability::with_subtasks(&["A", "B", "C"]).failing("B"));
    let pipeline = DelegationPipeline::from_config(&Config::default(), capability.clone());

    let err = tokio_test::assert_err!(pipeline.run("Analyze X").await);

    assert_eq!(err.stage(), Stage::Worker);
    assert!(matches!(err, PipelineError::Worker { subtask_id: 2, .. }));
    assert_eq!(capability.synthesizer_calls(), 0);
}

#[tokio::test]
async fn test_worker_timeout_fails_the_run() {
    let capability = Arc::new(
        ScriptedCapability::with_subtasks(&["A", "B"]).slow("B", Duration::from_secs(5)),
    );
    let pipeline = DelegationPipeline::new(
        Orchestrator::new(capability.clone(), "planner"),
        WorkerPool::new(
            Worker::new(capability.clone(), ModelRouter::new("worker"))
                .with_timeout(Duration::from_millis(100)),
        ),
        Synthesizer::new(capability.clone(), "writer"),
    );

    let err = pipeline.run("Analyze X").await.unwrap_err();

    assert_eq!(err.stage(), Stage::Worker);
    assert!(err.to_string().contains("subtask 2"), "{}", err);
    assert_eq!(capability.synthesizer_calls(), 0);
}

#[tokio::test]
async fn test_workers_run_concurrently() -> anyhow::Result<()> {
    let capability = Arc::new(
        ScriptedCapability::with_subtasks(&["A", "B", "C"]).worker_delay(Duration::from_millis(50)),
    );
    DelegationPipeline::from_config(&Config::default(), capability.clone())
        .run("Analyze X")
        .await?;

    assert_eq!(capability.max_in_flight.load(std::sync::atomic::Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() -> anyhow::Result<()> {
    let capability = Arc::new(
        ScriptedCapability::with_subtasks(&["A", "B", "C"]).worker_delay(Duration::from_millis(20)),
    );
    let mut config = Config::default();
    config.pipeline.max_concurrency = Some(1);
    DelegationPipeline::from_config(&config, capability.clone())
        .run("Analyze X")
        .await?;

    assert_eq!(capability.max_in_flight.load(std::sync::atomic::Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_unparseable_plan_fails_orchestrator_stage() {
    let mut scripted = ScriptedCapability::with_subtasks(&["A"]);
    scripted.plan = "I would split this into a few parts...".to_string();
    let pipeline = DelegationPipeline::from_config(&Config::default(), Arc::new(scripted));

    let err = tokio_test::assert_err!(pipeline.run("Analyze X").await);
    assert_eq!(err.stage(), Stage::Orchestrator);
}

#[tokio::test]
async fn test_report_markdown_lists_workers() -> anyhow::Result<()> {
    let capability = Arc::new(ScriptedCapability::with_subtasks(&["A", "B"]));
    let report = DelegationPipeline::from_config(&Config::default(), capability)
        .run("Analyze X")
        .await?;

    let markdown = report.to_markdown();
    assert!(markdown.contains("## Worker contributions"));
    assert!(markdown.contains("- Subtask 1 (A specialist)"));
    assert!(markdown.contains("- Subtask 2 (B specialist)"));
    Ok(())
}
