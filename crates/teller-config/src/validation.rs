//! Configuration validation

use crate::expr::{ContextSchema, Effect, ExprError, Guard};
use crate::schema::{RawConfig, RawState, RawTransition};
use std::collections::BTreeMap;
use teller_api::ActionSpec;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("{role} state '{state}' is not declared")]
    UndeclaredState { role: &'static str, state: String },

    #[error("State '{state}': {message}")]
    StateError { state: String, message: String },

    #[error("State '{state}', event '{key}': target '{target}' is not declared")]
    UnknownTarget {
        state: String,
        key: String,
        target: String,
    },

    #[error("State '{state}', event '{key}': invalid {part}: {error}")]
    InvalidExpression {
        state: String,
        key: String,
        part: &'static str,
        error: ExprError,
    },

    #[error("State '{state}', event '{key}': {message}")]
    TransitionError {
        state: String,
        key: String,
        message: String,
    },

    #[error("'{0}' is declared both as a counter and as a flag")]
    DuplicateField(String),

    #[error("Timeout '{0}' must be greater than zero")]
    ZeroTimeout(String),

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.states.is_empty() {
        errors.push(ValidationError::GlobalError("no states declared".into()));
        return errors;
    }

    for name in config.counters.keys() {
        if config.flags.contains_key(name) {
            errors.push(ValidationError::DuplicateField(name.clone()));
        }
    }

    for (name, secs) in &config.timeouts {
        if *secs == 0 {
            errors.push(ValidationError::ZeroTimeout(name.clone()));
        }
    }

    errors.extend(validate_engine(config));

    let schema = ContextSchema::new(
        config.counters.iter().map(|(k, v)| (k.clone(), *v)),
        config.flags.iter().map(|(k, v)| (k.clone(), *v)),
    );

    for (name, state) in &config.states {
        errors.extend(validate_state(name, state, config, &schema));
    }

    errors
}

fn validate_engine(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let engine = &config.engine;

    if !config.states.contains_key(&engine.initial_state) {
        errors.push(ValidationError::UndeclaredState {
            role: "Initial",
            state: engine.initial_state.clone(),
        });
    }

    match config.states.get(&engine.failure_state) {
        None => errors.push(ValidationError::UndeclaredState {
            role: "Failure",
            state: engine.failure_state.clone(),
        }),
        Some(state) if !state.terminal => errors.push(ValidationError::StateError {
            state: engine.failure_state.clone(),
            message: "the failure state must be terminal".into(),
        }),
        Some(_) => {}
    }

    match (&engine.idle_state, &engine.idle_timer) {
        (Some(idle_state), Some(idle_timer)) => {
            if !config.states.contains_key(idle_state) {
                errors.push(ValidationError::UndeclaredState {
                    role: "Idle",
                    state: idle_state.clone(),
                });
            }
            if !config.timeouts.contains_key(idle_timer) {
                errors.push(ValidationError::GlobalError(format!(
                    "idle timer '{}' has no entry in [timeouts]",
                    idle_timer
                )));
            }
        }
        (None, None) => {}
        _ => errors.push(ValidationError::GlobalError(
            "idle_state and idle_timer must be set together".into(),
        )),
    }

    if let Some(action) = &engine.recovery_action
        && action.is_clock()
    {
        errors.push(ValidationError::GlobalError(
            "recovery_action cannot be a clock action".into(),
        ));
    }

    errors
}

fn validate_state(
    name: &str,
    state: &RawState,
    config: &RawConfig,
    schema: &ContextSchema,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if state.terminal && !state.on.is_empty() {
        errors.push(ValidationError::StateError {
            state: name.to_string(),
            message: "terminal states cannot declare transitions".into(),
        });
    }

    for (key, transition) in &state.on {
        errors.extend(validate_transition(name, key, transition, config, schema));
    }

    errors
}

fn validate_transition(
    state: &str,
    key: &str,
    transition: &RawTransition,
    config: &RawConfig,
    schema: &ContextSchema,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut check_target = |target: &Option<String>| {
        if let Some(target) = target
            && !config.states.contains_key(target)
        {
            errors.push(ValidationError::UnknownTarget {
                state: state.to_string(),
                key: key.to_string(),
                target: target.clone(),
            });
        }
    };
    check_target(&transition.to);
    if let Some(fallback) = &transition.fallback {
        check_target(&fallback.to);
    }

    if let Some(source) = non_blank(&transition.guard)
        && let Err(error) = Guard::parse(source, schema)
    {
        errors.push(ValidationError::InvalidExpression {
            state: state.to_string(),
            key: key.to_string(),
            part: "guard",
            error,
        });
    }

    if let Some(source) = non_blank(&transition.after)
        && let Err(error) = Effect::parse(source, schema)
    {
        errors.push(ValidationError::InvalidExpression {
            state: state.to_string(),
            key: key.to_string(),
            part: "after",
            error,
        });
    }

    if transition.fallback.is_some() && non_blank(&transition.guard).is_none() {
        errors.push(ValidationError::TransitionError {
            state: state.to_string(),
            key: key.to_string(),
            message: "fallback declared without a guard".into(),
        });
    }

    let fallback_actions = transition.fallback.iter().flat_map(|f| f.actions.iter());
    for action in transition.actions.iter().chain(fallback_actions) {
        if let Err(message) = validate_action(action, &config.timeouts) {
            errors.push(ValidationError::TransitionError {
                state: state.to_string(),
                key: key.to_string(),
                message,
            });
        }
    }

    errors
}

/// Check engine-handled actions; everything else is opaque to the engine
///
/// A `start_timer` without `secs` takes its duration from the `[timeouts]`
/// entry named after the timer.
pub fn validate_action(
    action: &ActionSpec,
    timeouts: &BTreeMap<String, u64>,
) -> Result<(), String> {
    if !action.is_clock() {
        return Ok(());
    }
    if !action.is_start_timer() && !action.is_cancel_timer() {
        return Err(format!("unknown clock action '{}'", action.name));
    }

    let timer = match action.arg_str("state") {
        Some(timer) if !timer.trim().is_empty() => timer,
        _ => return Err(format!("{} needs a non-empty 'state' argument", action)),
    };

    if action.is_cancel_timer() {
        return Ok(());
    }
    match action.args.get("secs") {
        None if timeouts.contains_key(timer) => Ok(()),
        None => Err(format!(
            "{} has no 'secs' argument and no [timeouts] entry named '{}'",
            action, timer
        )),
        Some(secs) => match secs.as_u64() {
            Some(secs) if secs > 0 => Ok(()),
            _ => Err(format!("{} needs a positive integer 'secs' argument", action)),
        },
    }
}

/// Blank expressions are treated as absent
pub fn non_blank(source: &Option<String>) -> Option<&str> {
    source.as_deref().filter(|s| !s.trim().is_empty())
}
