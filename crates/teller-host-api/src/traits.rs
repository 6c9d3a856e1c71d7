//! Decision Provider and Action Executor traits

use async_trait::async_trait;
use teller_api::{ActionOutcome, ActionSpec, Decision, DecisionRequest};
use thiserror::Error;

/// Errors from a Decision Provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed decision: {0}")]
    Malformed(String),

    #[error("No decision available")]
    Exhausted,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors from an Action Executor
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Unsupported action: {0}")]
    Unsupported(String),

    #[error("Action {action} failed: {message}")]
    Failed { action: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Mutable view of a transaction's context handed to executors
///
/// Counters and flags are limited to the rule-declared schema; setters
/// return `false` for undeclared names. Slots are free-form scratch values
/// owned by executors (e.g. the expected OTP) and are never visible to
/// guards.
pub trait ContextAccess: Send {
    fn counter(&self, name: &str) -> Option<u32>;

    fn set_counter(&mut self, name: &str, value: u32) -> bool;

    fn flag(&self, name: &str) -> Option<bool>;

    fn set_flag(&mut self, name: &str, value: bool) -> bool;

    fn slot(&self, name: &str) -> Option<&str>;

    fn set_slot(&mut self, name: &str, value: String);

    fn remove_slot(&mut self, name: &str) -> Option<String>;
}

/// Intent classifier consulted for voice-driven states
///
/// Implementations must return an intent from `request.allowed_intents`
/// (or a conservative `cancel`) and contain their own retry and timeout
/// policy. The engine blocks on this call and trusts the result.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn decide(&self, request: &DecisionRequest) -> ProviderResult<Decision>;

    /// Short name for logs
    fn name(&self) -> &str {
        "provider"
    }
}

/// Performs UI/TTS/API effects for rendered actions
///
/// `clock/start_timer` is handled by the engine and never reaches an
/// executor.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn run(
        &self,
        action: &ActionSpec,
        ctx: &mut dyn ContextAccess,
    ) -> ExecutorResult<ActionOutcome>;

    /// Short name for logs
    fn name(&self) -> &str {
        "executor"
    }
}
