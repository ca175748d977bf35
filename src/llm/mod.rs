//! LLM orchestration layer: gateway client, circuit breaker, prompt
//! templates and the operation-level orchestrator

pub mod breaker;
pub mod client;
pub mod orchestrator;
pub mod prompts;

pub use breaker::{BreakerState, CircuitBreaker};
pub use client::{system_message, user_message, GatewayLlmClient, LlmClient, Message, Role};
pub use orchestrator::{
    fallback_evaluation, AcademicContext, Evaluation, GeneratedQuestion, LlmOrchestrator,
};
