//! Orchestrator-workers delegation
//!
//! One orchestrator decomposes a task, independent workers handle the
//! subtasks concurrently, and a synthesizer merges their reports.

pub mod error;
pub mod plan;
pub mod orchestrator;
pub mod worker;
pub mod synthesizer;
pub mod pipeline;

// Re-export commonly used types
pub use error::{PipelineError, Stage};
pub use plan::{FinalReport, SubtaskSpec, Task, WorkerResult};
pub use orchestrator::Orchestrator;
pub use worker::{ModelRouter, Worker, WorkerPool};
pub use synthesizer::{check_coverage, Synthesizer};
pub use pipeline::{DelegationPipeline, PipelineProgress, ProgressCallback};
