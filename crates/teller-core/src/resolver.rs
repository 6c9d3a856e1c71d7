//! Transition resolution
//!
//! Event-to-transition precedence, first match wins:
//! 1. a literal signal (or timer expiry) declared for the current state
//! 2. the Decision's intent declared for the current state
//! 3. the state's `_auto` transition
//! 4. nothing: route to the failure state with the recovery action
//!
//! Resolution never fails. State changes go through [`enter_state`], which
//! keeps the idle timer armed exactly while the transaction sits in the
//! idle state.

use chrono::{DateTime, Local};
use teller_api::{ActionSpec, Decision, Event, Resolution, AUTO_KEY};
use teller_config::{RuleSet, Transition};
use tracing::{debug, trace};

use crate::{apply_effect, guard_holds, TransactionContext};

/// Result of resolving one event
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Rule key that matched, if any
    pub key: Option<String>,
    pub to: String,
    pub resolution: Resolution,
    /// Unrendered actions, in declared order
    pub actions: Vec<ActionSpec>,
}

/// Select and apply the transition for `event` in `state`
///
/// Mutates `ctx` through the after-effect (guard held) and the idle timer
/// coupling (state changed). A pure function of its inputs otherwise.
pub fn resolve(
    rules: &RuleSet,
    state: &str,
    event: &Event,
    decision: Option<&Decision>,
    ctx: &mut TransactionContext,
    now: DateTime<Local>,
) -> Resolved {
    let Some((key, transition)) = select(rules, state, event, decision) else {
        debug!(state, event = %event, "No transition matched, routing to failure state");
        let to = rules.failure_state().to_string();
        enter_state(rules, state, &to, ctx, now);
        return Resolved {
            key: None,
            to,
            resolution: Resolution::Unresolved,
            actions: vec![rules.recovery_action().clone()],
        };
    };

    if !guard_holds(transition.guard.as_ref(), ctx) {
        trace!(state, key, guard = ?transition.guard.as_ref().map(|g| &g.source), "Guard failed");

        if let Some(fallback) = &transition.fallback {
            enter_state(rules, state, &fallback.to, ctx, now);
            return Resolved {
                key: Some(key.to_string()),
                to: fallback.to.clone(),
                resolution: Resolution::FellBack,
                actions: fallback.actions.clone(),
            };
        }

        return Resolved {
            key: Some(key.to_string()),
            to: state.to_string(),
            resolution: Resolution::Retried,
            actions: transition.actions.clone(),
        };
    }

    apply_effect(transition.after.as_ref(), ctx);
    enter_state(rules, state, &transition.to, ctx, now);

    Resolved {
        key: Some(key.to_string()),
        to: transition.to.clone(),
        resolution: Resolution::Transitioned,
        actions: transition.actions.clone(),
    }
}

fn select<'r>(
    rules: &'r RuleSet,
    state: &str,
    event: &Event,
    decision: Option<&Decision>,
) -> Option<(&'r str, &'r Transition)> {
    let state_rules = rules.state(state)?;
    let find = |key: &str| {
        state_rules
            .transitions
            .get_key_value(key)
            .map(|(k, t)| (k.as_str(), t))
    };

    if event.is_literal_signal()
        && let Some(found) = find(&event.key())
    {
        return Some(found);
    }

    let intent = match (decision, event) {
        (Some(d), _) => Some(d.intent.as_str()),
        (None, Event::Intent { name, .. }) => Some(name.as_str()),
        _ => None,
    };
    if let Some(found) = intent.and_then(find) {
        return Some(found);
    }

    find(AUTO_KEY)
}

/// Idle timer coupling, applied atomically with a state change
pub fn enter_state(
    rules: &RuleSet,
    from: &str,
    to: &str,
    ctx: &mut TransactionContext,
    now: DateTime<Local>,
) {
    if from == to {
        return;
    }
    let Some(idle) = rules.idle() else {
        return;
    };

    if to == idle.state {
        ctx.set_timer(&idle.timer, idle.secs, now);
    } else if from == idle.state {
        ctx.clear_timer(&idle.timer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teller_api::ActionKind;
    use teller_host_api::ContextAccess;

    const RULES: &str = r#"
        config_version = 1

        [engine]
        initial_state = "START"
        failure_state = "FAILED"
        idle_state = "OTP"
        idle_timer = "no_input"

        [timeouts]
        no_input = 20

        [counters]
        otp_fail = 0

        [states.START.on.reissue_card]
        to = "OTP"

        [states.START.on.face_ok]
        to = "FAILED"

        [states.OTP.on.provide_otp]
        actions = [{ kind = "api", name = "verify_otp", args = { otp = "{{params.otp}}" } }]

        [states.OTP.on.otp_ok]
        to = "DONE"

        [states.OTP.on.otp_wrong]
        guard = "otp_fail < 5"
        after = "otp_fail += 1"
        actions = [{ kind = "tts", name = "speak", args = { text = "Sai OTP" } }]
        fallback = { to = "FAILED", actions = [{ kind = "ui", name = "back_home" }] }

        [states.OTP.on.resend]
        guard = "otp_fail < 1"
        actions = [{ kind = "api", name = "resend_otp" }]

        [states.OTP.on._timeout_no_input]
        actions = [{ kind = "tts", name = "speak", args = { text = "Vui lòng đọc mã" } }]

        [states.WAIT.on._auto]
        to = "DONE"

        [states.DONE]
        terminal = true

        [states.FAILED]
        terminal = true
    "#;

    fn setup() -> (RuleSet, TransactionContext, DateTime<Local>) {
        let rules = teller_config::parse_config(RULES).unwrap().rules;
        let ctx = TransactionContext::new(rules.schema().clone());
        let now = teller_util::parse_mock_time("2025-06-01 09:00:00").unwrap();
        (rules, ctx, now)
    }

    #[test]
    fn signal_beats_intent() {
        let (rules, mut ctx, now) = setup();
        let decision = Decision::new("reissue_card");

        let resolved = resolve(&rules, "START", &Event::signal("face_ok"), Some(&decision), &mut ctx, now);
        assert_eq!(resolved.key.as_deref(), Some("face_ok"));
        assert_eq!(resolved.to, "FAILED");
    }

    #[test]
    fn undeclared_signal_falls_through_to_intent() {
        let (rules, mut ctx, now) = setup();
        let decision = Decision::new("reissue_card");

        let resolved = resolve(&rules, "START", &Event::signal("bogus"), Some(&decision), &mut ctx, now);
        assert_eq!(resolved.to, "OTP");
        assert_eq!(resolved.resolution, Resolution::Transitioned);
    }

    #[test]
    fn auto_transition_used_last() {
        let (rules, mut ctx, now) = setup();
        let resolved = resolve(&rules, "WAIT", &Event::signal("anything"), None, &mut ctx, now);
        assert_eq!(resolved.key.as_deref(), Some("_auto"));
        assert_eq!(resolved.to, "DONE");
    }

    #[test]
    fn unresolved_routes_to_failure_with_recovery_action() {
        let (rules, mut ctx, now) = setup();
        let decision = Decision::new("chitchat");

        let resolved = resolve(&rules, "START", &decision.clone().into_event(), Some(&decision), &mut ctx, now);
        assert_eq!(resolved.resolution, Resolution::Unresolved);
        assert_eq!(resolved.to, "FAILED");
        assert_eq!(resolved.actions, vec![ActionSpec::new(ActionKind::Ui, "back_home")]);
    }

    #[test]
    fn otp_retry_then_fallback() {
        let (rules, mut ctx, now) = setup();
        ctx.set_counter("otp_fail", 4);
        let wrong = Event::signal("otp_wrong");

        let resolved = resolve(&rules, "OTP", &wrong, None, &mut ctx, now);
        assert_eq!(resolved.resolution, Resolution::Transitioned);
        assert_eq!(resolved.to, "OTP");
        assert_eq!(resolved.actions[0].name, "speak");
        assert_eq!(ctx.counter("otp_fail"), Some(5));

        let resolved = resolve(&rules, "OTP", &wrong, None, &mut ctx, now);
        assert_eq!(resolved.resolution, Resolution::FellBack);
        assert_eq!(resolved.to, "FAILED");
        assert_eq!(resolved.actions[0].name, "back_home");
        assert_eq!(ctx.counter("otp_fail"), Some(5));
    }

    #[test]
    fn failed_guard_without_fallback_retries_in_place() {
        let (rules, mut ctx, now) = setup();
        ctx.set_counter("otp_fail", 3);
        let before = ctx.clone();

        let resolved = resolve(&rules, "OTP", &Event::signal("resend"), None, &mut ctx, now);
        assert_eq!(resolved.resolution, Resolution::Retried);
        assert_eq!(resolved.to, "OTP");
        assert_eq!(resolved.actions[0].name, "resend_otp");
        assert_eq!(ctx, before);
    }

    #[test]
    fn idle_timer_follows_idle_state() {
        let (rules, mut ctx, now) = setup();

        resolve(&rules, "START", &Event::signal("reissue_card"), None, &mut ctx, now);
        assert!(ctx.timers().is_active("no_input"));

        resolve(&rules, "OTP", &Event::signal("otp_ok"), None, &mut ctx, now);
        assert!(!ctx.timers().is_active("no_input"));
    }

    #[test]
    fn fallback_out_of_idle_state_disarms_idle_timer() {
        let (rules, mut ctx, now) = setup();
        resolve(&rules, "START", &Event::signal("reissue_card"), None, &mut ctx, now);
        ctx.set_counter("otp_fail", 5);

        resolve(&rules, "OTP", &Event::signal("otp_wrong"), None, &mut ctx, now);
        assert!(ctx.timers().is_empty());
    }

    #[test]
    fn timeout_event_uses_timeout_key() {
        let (rules, mut ctx, now) = setup();
        let resolved = resolve(&rules, "OTP", &Event::timeout("no_input"), None, &mut ctx, now);
        assert_eq!(resolved.key.as_deref(), Some("_timeout_no_input"));
        assert_eq!(resolved.to, "OTP");
    }
}
