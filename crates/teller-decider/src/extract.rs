//! Decision extraction from free-text model output

use serde_json::{json, Value};
use teller_api::{Decision, DecisionRequest, DecisionResponse, Params};

use crate::{DeciderError, DeciderResult};

const FENCE: &str = "```";
const FENCE_TAG: &str = "json";

/// Locate the decision JSON inside model output.
///
/// A fenced block wins, either bare or tagged `json` in any case; otherwise
/// the span from the first `{` to the last `}` is taken.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(block) = fenced_block(text) {
        return Some(block);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find(FENCE)?;
    let mut body = &text[start + FENCE.len()..];
    if body
        .get(..FENCE_TAG.len())
        .is_some_and(|tag| tag.eq_ignore_ascii_case(FENCE_TAG))
    {
        body = &body[FENCE_TAG.len()..];
    }
    let end = body.find(FENCE)?;
    let block = body[..end].trim();
    block.starts_with('{').then_some(block)
}

/// Turn model output into a [`Decision`] for `request`.
///
/// In strict mode every field of the decision schema must be present: a
/// string `intent`, an object `params` and a `response` object with string
/// `type` and `content`. An intent outside the allowed set is then coerced
/// to `cancel`.
/// The suggested reply is always discarded.
pub fn parse_decision(
    text: &str,
    request: &DecisionRequest,
    strict: bool,
) -> DeciderResult<Decision> {
    let raw = extract_json(text).ok_or(DeciderError::NoJson)?;
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(object) = value else {
        return Err(DeciderError::Schema("decision must be a JSON object".into()));
    };

    let intent = match object.get("intent") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(_) => return Err(DeciderError::Schema("'intent' must be a non-empty string".into())),
        None => return Err(DeciderError::Schema("missing 'intent'".into())),
    };

    let params = match object.get("params") {
        Some(Value::Object(p)) => p.clone(),
        _ if strict => return Err(DeciderError::Schema("'params' must be an object".into())),
        _ => Params::new(),
    };

    if strict {
        check_response(object.get("response"))?;
    }

    if strict && !request.allows(&intent) {
        tracing::warn!(
            state = %request.state,
            intent = %intent,
            "Intent outside allowed set, coercing to cancel"
        );
        let mut decision = Decision::cancel(format!("intent '{}' not allowed", intent));
        if let Some(Value::Object(meta)) = decision.meta.as_mut() {
            meta.insert("coerced_from".into(), json!(intent));
        }
        return Ok(decision);
    }

    Ok(Decision {
        params,
        response: DecisionResponse::default(),
        ..Decision::new(intent)
    })
}

fn check_response(response: Option<&Value>) -> DeciderResult<()> {
    let Some(Value::Object(fields)) = response else {
        return Err(DeciderError::Schema("'response' must be an object".into()));
    };
    for key in ["type", "content"] {
        if !matches!(fields.get(key), Some(Value::String(_))) {
            return Err(DeciderError::Schema(format!("'response.{}' must be a string", key)));
        }
    }
    Ok(())
}

/// Conservative decision recording why classification failed
pub fn fallback_decision(error: &DeciderError, raw: Option<&str>) -> Decision {
    let mut decision = Decision::cancel(error.to_string());
    if let (Some(raw), Some(Value::Object(meta))) = (raw, decision.meta.as_mut()) {
        meta.insert("raw".into(), Value::String(raw.to_string()));
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use teller_api::{Input, ResponseKind};

    fn request() -> DecisionRequest {
        DecisionRequest {
            state: "OTP".into(),
            allowed_intents: vec!["provide_otp".into(), "resend_otp".into(), "cancel".into()],
            input: Input::voice("mã là 482913"),
            prompt: None,
            counters: BTreeMap::new(),
            flags: BTreeMap::new(),
        }
    }

    #[test]
    fn extract_prefers_fenced_block() {
        let text = "Sure {not this}\n```json\n{\"intent\": \"cancel\"}\n```\ntrailing }";
        assert_eq!(extract_json(text), Some("{\"intent\": \"cancel\"}"));
    }

    #[test]
    fn extract_accepts_any_fence_tag_case() {
        let text = "```JSON\n{\"intent\": \"cancel\"}\n```";
        assert_eq!(extract_json(text), Some("{\"intent\": \"cancel\"}"));

        let text = "Đây:\n```Json {\"intent\": \"cancel\"} ```";
        assert_eq!(extract_json(text), Some("{\"intent\": \"cancel\"}"));
    }

    #[test]
    fn extract_accepts_bare_fence() {
        let text = "ok {skip}\n```\n{\"intent\": \"resend_otp\"}\n```";
        assert_eq!(extract_json(text), Some("{\"intent\": \"resend_otp\"}"));
    }

    #[test]
    fn extract_falls_back_to_brace_span() {
        let text = "Kết quả: {\"intent\": \"provide_otp\", \"params\": {\"otp\": \"1234\"}} xong";
        assert_eq!(
            extract_json(text),
            Some("{\"intent\": \"provide_otp\", \"params\": {\"otp\": \"1234\"}}")
        );
    }

    #[test]
    fn extract_without_json() {
        assert_eq!(extract_json("no braces here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn parse_valid_decision() {
        let text = r#"{"intent": "provide_otp", "params": {"otp": "482913"},
                      "response": {"type": "text", "content": "Cảm ơn"}}"#;
        let decision = parse_decision(text, &request(), true).unwrap();

        assert_eq!(decision.intent, "provide_otp");
        assert_eq!(decision.params["otp"], "482913");
        assert_eq!(decision.response.kind, ResponseKind::None);
        assert_eq!(decision.response.content, "");
        assert!(decision.meta.is_none());
    }

    #[test]
    fn parse_coerces_unknown_intent() {
        let text = r#"{"intent": "open_account", "params": {},
                      "response": {"type": "text", "content": ""}}"#;
        let decision = parse_decision(text, &request(), true).unwrap();

        assert_eq!(decision.intent, "cancel");
        let meta = decision.meta.unwrap();
        assert_eq!(meta["coerced_from"], "open_account");
    }

    #[test]
    fn parse_lenient_keeps_unknown_intent() {
        let text = r#"{"intent": "open_account", "params": [1, 2]}"#;
        let decision = parse_decision(text, &request(), false).unwrap();

        assert_eq!(decision.intent, "open_account");
        assert!(decision.params.is_empty());

        let decision = parse_decision(r#"{"intent": "cancel"}"#, &request(), false).unwrap();
        assert_eq!(decision.intent, "cancel");
    }

    #[test]
    fn parse_rejects_schema_violations() {
        let cases = [
            r#"{"params": {}}"#,
            r#"{"intent": 3}"#,
            r#"{"intent": "  "}"#,
            r#"{"intent": "cancel", "params": "x", "response": {"type": "text", "content": ""}}"#,
            r#"{"intent": "cancel", "params": {}, "response": "hi"}"#,
            r#"{"intent": "cancel", "params": {}, "response": {"type": 1, "content": ""}}"#,
            r#"{"intent": "cancel"}"#,
            r#"{"intent": "cancel", "response": {"type": "text", "content": ""}}"#,
            r#"{"intent": "cancel", "params": null, "response": {"type": "text", "content": ""}}"#,
            r#"{"intent": "cancel", "params": {}}"#,
            r#"{"intent": "cancel", "params": {}, "response": {"type": "text"}}"#,
        ];
        for text in cases {
            assert!(
                matches!(parse_decision(text, &request(), true), Err(DeciderError::Schema(_))),
                "expected schema error for {}",
                text
            );
        }
    }

    #[test]
    fn parse_reports_bad_json() {
        assert!(matches!(
            parse_decision("{intent: cancel}", &request(), true),
            Err(DeciderError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_decision("không biết", &request(), true),
            Err(DeciderError::NoJson)
        ));
    }

    #[test]
    fn fallback_records_error_and_raw() {
        let decision = fallback_decision(&DeciderError::NoJson, Some("không biết"));
        assert_eq!(decision.intent, "cancel");
        let meta = decision.meta.unwrap();
        assert_eq!(meta["error"], "No JSON found in model output");
        assert_eq!(meta["raw"], "không biết");
    }
}
