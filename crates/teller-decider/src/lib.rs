//! HTTP Decision Provider for the teller kiosk engine
//!
//! Classifies voice input by posting a JSON prompt to an LLM endpoint and
//! turning its free-text reply into a [`Decision`](teller_api::Decision):
//! - Bounded retry with exponential backoff on transport errors
//! - Decision JSON extraction from fenced blocks or brace spans
//! - Schema checks and coercion into the allowed-intent set
//! - Any failure degrades to a conservative `cancel`

mod error;
mod extract;
mod http;
mod prompt;

pub use error::*;
pub use extract::*;
pub use http::*;
pub use prompt::*;
