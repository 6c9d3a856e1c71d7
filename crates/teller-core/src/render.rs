//! Action rendering and dispatch

use chrono::{DateTime, Local};
use serde_json::Value;
use teller_api::{ActionSpec, Params};
use teller_host_api::ActionExecutor;
use tracing::{debug, trace, warn};

use crate::TransactionContext;

const PLACEHOLDER_OPEN: &str = "{{";
const PLACEHOLDER_CLOSE: &str = "}}";
const PARAMS_PREFIX: &str = "params.";

/// Substitute `{{params.<key>}}` placeholders throughout an action's args
pub fn render_action(action: &ActionSpec, params: &Params) -> ActionSpec {
    ActionSpec {
        kind: action.kind,
        name: action.name.clone(),
        args: action
            .args
            .iter()
            .map(|(k, v)| (k.clone(), render_value(v, params)))
            .collect(),
    }
}

/// Render one value, descending into arrays and objects
pub fn render_value(value: &Value, params: &Params) -> Value {
    match value {
        Value::String(s) => Value::String(render_str(s, params)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, params)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, params)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Missing or null params render as the empty string; placeholders that do
/// not name a param are left untouched.
pub fn render_str(template: &str, params: &Params) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
        let after_open = &rest[start + PLACEHOLDER_OPEN.len()..];
        let Some(end) = after_open.find(PLACEHOLDER_CLOSE) else {
            break;
        };

        out.push_str(&rest[..start]);
        let inner = after_open[..end].trim();
        match inner.strip_prefix(PARAMS_PREFIX) {
            Some(key) => out.push_str(&param_text(params.get(key.trim()))),
            None => {
                out.push_str(PLACEHOLDER_OPEN);
                out.push_str(&after_open[..end]);
                out.push_str(PLACEHOLDER_CLOSE);
            }
        }
        rest = &after_open[end + PLACEHOLDER_CLOSE.len()..];
    }

    out.push_str(rest);
    out
}

fn param_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Run rendered actions in declared order
///
/// Clock actions (`start_timer`, `cancel_timer`) act on the transaction's
/// timers and never reach the executor. Returns the signal of the last action that produced one.
/// Executor failures are logged and count as "no signal".
pub async fn dispatch(
    actions: &[ActionSpec],
    executor: &dyn ActionExecutor,
    ctx: &mut TransactionContext,
    now: DateTime<Local>,
) -> Option<String> {
    let mut last_signal = None;

    for action in actions {
        if action.is_clock() {
            run_clock(action, ctx, now);
            continue;
        }

        trace!(action = %action, args = ?action.args, "Dispatching action");
        match executor.run(action, ctx).await {
            Ok(outcome) => {
                if let Some(signal) = outcome.signal {
                    debug!(action = %action, signal = %signal, "Action produced signal");
                    last_signal = Some(signal);
                }
            }
            Err(e) => {
                warn!(
                    action = %action,
                    executor = executor.name(),
                    error = %e,
                    "Action failed"
                );
            }
        }
    }

    last_signal
}

fn run_clock(action: &ActionSpec, ctx: &mut TransactionContext, now: DateTime<Local>) {
    let name = action.arg_str("state").map(str::trim).filter(|s| !s.is_empty());

    if action.is_cancel_timer() {
        match name {
            Some(name) => {
                let was_armed = ctx.clear_timer(name);
                debug!(timer = name, was_armed, "Timer cancelled");
            }
            None => warn!(args = ?action.args, "Ignoring malformed cancel_timer action"),
        }
        return;
    }
    if !action.is_start_timer() {
        warn!(action = %action, "Ignoring unknown clock action");
        return;
    }

    let secs = action.args.get("secs").and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });

    match (name, secs) {
        (Some(name), Some(secs)) if secs > 0 => {
            let deadline = ctx.set_timer(name, secs, now);
            debug!(
                timer = name,
                secs,
                deadline = %teller_util::format_datetime_full(&deadline),
                "Timer armed"
            );
        }
        _ => warn!(args = ?action.args, "Ignoring malformed start_timer action"),
    }
}
