//! Validated rule set and service settings

use crate::expr::{ContextSchema, Effect, Guard};
use crate::schema::{RawConfig, RawDeciderConfig, RawFallback, RawServiceConfig, RawState, RawTransition};
use crate::validation::{non_blank, ValidationError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use teller_api::{ActionKind, ActionSpec, PromptSpec, RESERVED_KEY_PREFIX};

/// Fully validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub decider: DeciderConfig,
    pub rules: RuleSet,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Result<Self, ValidationError> {
        let service = ServiceConfig::from_raw(&raw.service);
        let decider = DeciderConfig::from_raw(&raw.decider);
        let rules = RuleSet::from_raw(raw)?;
        Ok(Self {
            service,
            decider,
            rules,
        })
    }
}

/// Process-level settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub tick_interval: Duration,
    pub max_chain: u32,
    pub trace: bool,
}

impl ServiceConfig {
    fn from_raw(raw: &RawServiceConfig) -> Self {
        let defaults = Self::default();
        Self {
            tick_interval: raw
                .tick_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            max_chain: raw.max_chain.unwrap_or(defaults.max_chain),
            trace: raw.trace,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            max_chain: 16,
            trace: false,
        }
    }
}

/// Decision Provider settings
#[derive(Debug, Clone)]
pub struct DeciderConfig {
    pub url: Option<String>,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub strict: bool,
}

impl DeciderConfig {
    fn from_raw(raw: &RawDeciderConfig) -> Self {
        let defaults = Self::default();
        Self {
            url: raw.url.clone().filter(|u| !u.trim().is_empty()),
            timeout: raw
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_attempts: raw.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            strict: raw.strict.unwrap_or(defaults.strict),
        }
    }
}

impl Default for DeciderConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(12),
            max_attempts: 3,
            strict: true,
        }
    }
}

/// The idle timer bound to one state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleTimer {
    pub state: String,
    pub timer: String,
    pub secs: u64,
}

/// Rule-declared response to one (state, event key) pair
#[derive(Debug, Clone)]
pub struct Transition {
    pub to: String,
    pub guard: Option<Guard>,
    pub after: Option<Effect>,
    pub actions: Vec<ActionSpec>,
    pub fallback: Option<Fallback>,
}

/// Alternate route taken when a guard fails
#[derive(Debug, Clone)]
pub struct Fallback {
    pub to: String,
    pub actions: Vec<ActionSpec>,
}

/// All rules for one state
#[derive(Debug, Clone)]
pub struct StateRules {
    pub name: String,
    pub device_driven: bool,
    pub terminal: bool,
    pub prompt: Option<PromptSpec>,
    pub transitions: BTreeMap<String, Transition>,
}

/// Immutable rule store, built once by the loader
///
/// Every guarded self-loop in the data must be able to end: either its
/// guard eventually fails and a fallback is declared, or its after-effect
/// defeats the guard, or some other event changes the outcome. A guard
/// that can never hold with no fallback keeps the transaction in place for
/// as long as that input repeats.
#[derive(Debug, Clone)]
pub struct RuleSet {
    states: BTreeMap<String, StateRules>,
    initial_state: String,
    failure_state: String,
    idle: Option<IdleTimer>,
    recovery_action: ActionSpec,
    schema: Arc<ContextSchema>,
}

impl RuleSet {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Result<Self, ValidationError> {
        let schema = Arc::new(ContextSchema::new(raw.counters, raw.flags));

        let idle = match (raw.engine.idle_state, raw.engine.idle_timer) {
            (Some(state), Some(timer)) => {
                let secs = raw.timeouts.get(&timer).copied().unwrap_or_default();
                Some(IdleTimer { state, timer, secs })
            }
            _ => None,
        };

        let states = raw
            .states
            .into_iter()
            .map(|(name, state)| {
                let rules = convert_state(&name, state, &schema, &raw.timeouts)?;
                Ok((name, rules))
            })
            .collect::<Result<_, ValidationError>>()?;

        Ok(Self {
            states,
            initial_state: raw.engine.initial_state,
            failure_state: raw.engine.failure_state,
            idle,
            recovery_action: raw
                .engine
                .recovery_action
                .unwrap_or_else(|| ActionSpec::new(ActionKind::Ui, "back_home")),
            schema,
        })
    }

    /// Transition declared for `key` in `state`
    pub fn lookup(&self, state: &str, key: &str) -> Option<&Transition> {
        self.states.get(state)?.transitions.get(key)
    }

    /// Event keys of `state` that may be offered to the Decision Provider
    pub fn allowed_events(&self, state: &str) -> Vec<String> {
        self.states
            .get(state)
            .map(|s| {
                s.transitions
                    .keys()
                    .filter(|k| !k.starts_with(RESERVED_KEY_PREFIX))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn state(&self, name: &str) -> Option<&StateRules> {
        self.states.get(name)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn transition_count(&self) -> usize {
        self.states.values().map(|s| s.transitions.len()).sum()
    }

    pub fn is_device_driven(&self, state: &str) -> bool {
        self.states.get(state).is_some_and(|s| s.device_driven)
    }

    pub fn is_terminal(&self, state: &str) -> bool {
        self.states.get(state).is_some_and(|s| s.terminal)
    }

    pub fn prompt(&self, state: &str) -> Option<&PromptSpec> {
        self.states.get(state)?.prompt.as_ref()
    }

    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    pub fn failure_state(&self) -> &str {
        &self.failure_state
    }

    pub fn idle(&self) -> Option<&IdleTimer> {
        self.idle.as_ref()
    }

    pub fn recovery_action(&self) -> &ActionSpec {
        &self.recovery_action
    }

    pub fn schema(&self) -> &Arc<ContextSchema> {
        &self.schema
    }
}

// Conversion helpers

fn convert_state(
    name: &str,
    raw: RawState,
    schema: &ContextSchema,
    timeouts: &BTreeMap<String, u64>,
) -> Result<StateRules, ValidationError> {
    let transitions = raw
        .on
        .into_iter()
        .map(|(key, transition)| {
            let converted = convert_transition(name, &key, transition, schema, timeouts)?;
            Ok((key, converted))
        })
        .collect::<Result<_, ValidationError>>()?;

    Ok(StateRules {
        name: name.to_string(),
        device_driven: raw.device_driven,
        terminal: raw.terminal,
        prompt: raw.prompt,
        transitions,
    })
}

fn convert_transition(
    state: &str,
    key: &str,
    raw: RawTransition,
    schema: &ContextSchema,
    timeouts: &BTreeMap<String, u64>,
) -> Result<Transition, ValidationError> {
    let invalid = |part: &'static str| {
        move |error| ValidationError::InvalidExpression {
            state: state.to_string(),
            key: key.to_string(),
            part,
            error,
        }
    };

    let guard = non_blank(&raw.guard)
        .map(|source| Guard::parse(source, schema))
        .transpose()
        .map_err(invalid("guard"))?;
    let after = non_blank(&raw.after)
        .map(|source| Effect::parse(source, schema))
        .transpose()
        .map_err(invalid("after"))?;

    Ok(Transition {
        to: raw.to.unwrap_or_else(|| state.to_string()),
        guard,
        after,
        actions: with_timer_secs(raw.actions, timeouts),
        fallback: raw.fallback.map(|f| convert_fallback(state, f, timeouts)),
    })
}

fn convert_fallback(state: &str, raw: RawFallback, timeouts: &BTreeMap<String, u64>) -> Fallback {
    Fallback {
        to: raw.to.unwrap_or_else(|| state.to_string()),
        actions: with_timer_secs(raw.actions, timeouts),
    }
}

/// Fill in `secs` for every `start_timer` that names a `[timeouts]` entry
/// instead of carrying its own duration
fn with_timer_secs(mut actions: Vec<ActionSpec>, timeouts: &BTreeMap<String, u64>) -> Vec<ActionSpec> {
    for action in actions.iter_mut().filter(|a| a.is_start_timer()) {
        if action.args.contains_key("secs") {
            continue;
        }
        if let Some(secs) = action.arg_str("state").and_then(|timer| timeouts.get(timer)) {
            action.args.insert("secs".into(), (*secs).into());
        }
    }
    actions
}
