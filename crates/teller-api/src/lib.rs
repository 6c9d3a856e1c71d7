//! Data model for the teller kiosk engine
//!
//! This crate defines the types exchanged between the engine and its
//! collaborators:
//! - Inputs and events (what drives one tick)
//! - Decisions (what the Decision Provider returns)
//! - Action specs and outcomes (what the Action Executor receives and returns)
//! - Tick outcomes (what the caller gets back)

mod events;
mod requests;
mod types;

pub use events::*;
pub use requests::*;
pub use types::*;

/// Intent synthesized for device-driven states
pub const NO_OP_INTENT: &str = "_no_op";

/// Conservative intent used when a decision cannot be trusted
pub const CANCEL_INTENT: &str = "cancel";

/// Event key for a state's default transition
pub const AUTO_KEY: &str = "_auto";

/// Prefix of event keys synthesized from timer expiry
pub const TIMEOUT_KEY_PREFIX: &str = "_timeout_";

/// Event keys starting with this prefix are system-only and never offered
/// to the Decision Provider
pub const RESERVED_KEY_PREFIX: &str = "_";

/// Clock action arming a named timer (`state`, `secs` args)
pub const START_TIMER_ACTION: &str = "start_timer";

/// Clock action disarming a named timer (`state` arg)
pub const CANCEL_TIMER_ACTION: &str = "cancel_timer";
