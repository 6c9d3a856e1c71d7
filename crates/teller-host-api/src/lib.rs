//! Collaborator interfaces for the teller kiosk engine
//!
//! This crate defines the boundary between the transition engine and the
//! outside world: the intent classifier (Decision Provider) and the
//! device/UI/TTS/API layer (Action Executor). It contains no device code.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
