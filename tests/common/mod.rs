//! Scripted capability shared by the integration tests

#![allow(dead_code)]

use agent_workflows::{Capability, CapabilityError, CapabilityRequest};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Answers planner, worker and synthesizer prompts from fixed text.
///
/// Worker prompts are recognised by their "Your task: " line; a worker
/// whose description is listed in `failing` returns an error, one listed in
/// `slow` sleeps before answering.
pub struct ScriptedCapability {
    pub plan: String,
    pub failing: Vec<String>,
    pub slow: Vec<(String, Duration)>,
    pub worker_delay: Duration,
    pub calls: Mutex<Vec<CapabilityRequest>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedCapability {
    pub fn with_subtasks(descriptions: &[&str]) -> Self {
        let subtasks: Vec<serde_json::Value> = descriptions
            .iter()
            .map(|d| serde_json::json!({
                "description": d,
                "expertise_required": format!("{} specialist", d),
                "output_format": "short summary"
            }))
            .collect();
        Self {
            plan: serde_json::json!({ "subtasks": subtasks }).to_string(),
            failing: Vec::new(),
            slow: Vec::new(),
            worker_delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, description: &str) -> Self {
        self.failing.push(description.to_string());
        self
    }

    pub fn slow(mut self, description: &str, delay: Duration) -> Self {
        self.slow.push((description.to_string(), delay));
        self
    }

    pub fn worker_delay(mut self, delay: Duration) -> Self {
        self.worker_delay = delay;
        self
    }

    pub fn synthesizer_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.last_prompt().starts_with("ORIGINAL TASK:"))
            .count()
    }

    pub fn worker_models(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.last_prompt().starts_with("Your task: "))
            .map(|r| r.model.clone())
            .collect()
    }

    async fn answer_worker(&self, description: &str) -> Result<String, CapabilityError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = self
            .slow
            .iter()
            .find(|(d, _)| d == description)
            .map(|(_, delay)| *delay)
            .unwrap_or(self.worker_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.iter().any(|d| d == description) {
            return Err(CapabilityError::Api { status: 503, body: "worker model unavailable".into() });
        }
        Ok(format!("analysis of {}", description))
    }
}

#[async_trait]
impl Capability for ScriptedCapability {
    async fn complete(&self, request: CapabilityRequest) -> Result<String, CapabilityError> {
        self.calls.lock().unwrap().push(request.clone());
        let prompt = request.last_prompt();

        if prompt.starts_with("TASK:") {
            return Ok(self.plan.clone());
        }
        if prompt.starts_with("ORIGINAL TASK:") {
            return Ok(format!("# Final report\n\n{}", prompt));
        }
        if let Some(rest) = prompt.strip_prefix("Your task: ") {
            let description = rest.lines().next().unwrap_or_default().to_string();
            return self.answer_worker(&description).await;
        }
        Err(CapabilityError::MalformedResponse(format!("unexpected prompt: {}", prompt)))
    }
}
