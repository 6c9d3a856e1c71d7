//! Prompt construction

use serde_json::{json, Map, Value};
use teller_api::DecisionRequest;

/// JSON prompt body sent as the `query` string
///
/// Carries the state, the allowed intents, the utterance, the state's
/// prompt configuration and the transaction's counters and flags.
pub fn build_prompt(request: &DecisionRequest) -> Value {
    let prompt = request.prompt.as_ref();

    let mut context = Map::new();
    context.insert("state".into(), json!(request.state));
    context.insert("allowed_intents".into(), json!(request.allowed_intents));
    context.insert("input_channel".into(), json!(request.input.channel));
    if let Some(signal) = &request.input.signal {
        context.insert("system_signal".into(), json!(signal));
    }
    if !request.counters.is_empty() {
        context.insert("session_counters".into(), json!(request.counters));
    }
    if !request.flags.is_empty() {
        context.insert("session_flags".into(), json!(request.flags));
    }

    let mut body = Map::new();
    body.insert(
        "system".into(),
        json!(prompt.map(|p| p.system.trim()).unwrap_or_default()),
    );
    body.insert("context".into(), Value::Object(context));
    body.insert("state".into(), json!(request.state));
    body.insert("allowed_intents".into(), json!(request.allowed_intents));
    body.insert("user_utterance".into(), json!(request.raw_input()));

    if let Some(instructions) = prompt
        .and_then(|p| p.instructions.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        body.insert("instructions".into(), json!(instructions));
    }
    if let Some(p) = prompt
        && !p.examples.is_empty()
    {
        body.insert("examples".into(), json!(p.examples));
    }

    Value::Object(body)
}
