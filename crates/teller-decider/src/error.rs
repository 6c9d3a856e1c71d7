//! Decider errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeciderError {
    #[error("No decider URL configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint reply has no 'response' text")]
    MissingResponse,

    #[error("No JSON found in model output")]
    NoJson,

    #[error("Invalid JSON in model output: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Schema: {0}")]
    Schema(String),
}

impl DeciderError {
    /// Transport failures are worth another attempt; bad output is not
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

pub type DeciderResult<T> = Result<T, DeciderError>;
