//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use teller_api::{ActionSpec, PromptSpec};

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Process-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Decision Provider endpoint settings
    #[serde(default)]
    pub decider: RawDeciderConfig,

    /// Engine wiring: initial, failure and idle states
    pub engine: RawEngineConfig,

    /// Named durations in seconds
    #[serde(default)]
    pub timeouts: BTreeMap<String, u64>,

    /// Counter names and initial values
    #[serde(default)]
    pub counters: BTreeMap<String, u32>,

    /// Flag names and initial values
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,

    /// Per-state rules
    #[serde(default)]
    pub states: BTreeMap<String, RawState>,
}

/// Process-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// How often the driver polls timers, in milliseconds
    pub tick_interval_ms: Option<u64>,

    /// Upper bound on chained synthetic ticks per external input
    pub max_chain: Option<u32>,

    /// Verbose tracing of decisions and actions
    #[serde(default)]
    pub trace: bool,
}

/// Decision Provider settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDeciderConfig {
    /// Classifier endpoint (POST `{"query": ...}`)
    pub url: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Attempts per classification (transport errors only)
    pub max_attempts: Option<u32>,

    /// Enforce the decision schema and the allowed-intent set
    pub strict: Option<bool>,
}

/// Engine wiring
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawEngineConfig {
    /// State every new transaction starts in
    pub initial_state: String,

    /// Universal "could not resolve" sink
    pub failure_state: String,

    /// State whose idle timer is armed on entry and disarmed on exit
    pub idle_state: Option<String>,

    /// Name of the idle timer (its duration comes from `[timeouts]`)
    pub idle_timer: Option<String>,

    /// Action emitted when no transition matches (default `ui/back_home`)
    pub recovery_action: Option<ActionSpec>,
}

/// Rules for one state
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawState {
    /// Progress is driven by device/system signals only
    #[serde(default)]
    pub device_driven: bool,

    /// No further ticks are processed once here
    #[serde(default)]
    pub terminal: bool,

    /// Classifier prompt for this state
    #[serde(default)]
    pub prompt: Option<PromptSpec>,

    /// Event key -> transition
    #[serde(default)]
    pub on: BTreeMap<String, RawTransition>,
}

/// Declared transition
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTransition {
    /// Target state (default: stay)
    pub to: Option<String>,

    /// Boolean guard expression
    pub guard: Option<String>,

    /// Assignment statements run when the guard holds
    pub after: Option<String>,

    #[serde(default)]
    pub actions: Vec<ActionSpec>,

    /// Taken when the guard fails
    pub fallback: Option<RawFallback>,
}

/// Fallback for a failed guard
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawFallback {
    /// Target state (default: stay)
    pub to: Option<String>,

    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}
