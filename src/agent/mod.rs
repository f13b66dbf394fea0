//! Agent module - model capability, LLM client and clarification chat

pub mod capability;
pub mod clarify;
pub mod llm;

pub use capability::{Capability, CapabilityError, CapabilityRequest};
pub use clarify::{ClarificationAgent, ClarifyError, ClarifyOutcome, InputKind};
pub use llm::OpenRouterClient;
