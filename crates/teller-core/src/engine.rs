//! Tick driver

use chrono::{DateTime, Local};
use std::sync::Arc;
use teller_api::{
    timeout_key, Decision, DecisionRequest, Event, Input, Params, Resolution, TickOutcome,
};
use teller_config::RuleSet;
use teller_host_api::{ActionExecutor, DecisionProvider};
use teller_util::TransactionId;
use tracing::{debug, info, trace, warn};

use crate::{dispatch, render_action, resolve, TransactionContext};

/// One in-flight transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    pub state: String,
    pub ctx: TransactionContext,
    pub started_at: DateTime<Local>,
}

impl Transaction {
    /// New transaction in the initial state with schema defaults
    pub fn start(rules: &RuleSet, now: DateTime<Local>) -> Self {
        let mut ctx = TransactionContext::new(rules.schema().clone());
        let state = rules.initial_state().to_string();
        if let Some(idle) = rules.idle()
            && idle.state == state
        {
            ctx.set_timer(&idle.timer, idle.secs, now);
        }

        let txn = Self {
            id: TransactionId::new(),
            state,
            ctx,
            started_at: now,
        };
        info!(transaction_id = %txn.id, state = %txn.state, "Transaction started");
        txn
    }

    pub fn is_finished(&self, rules: &RuleSet) -> bool {
        rules.is_terminal(&self.state)
    }
}

/// The transition engine
///
/// Holds only immutable collaborators; all per-transaction state lives in
/// [`Transaction`], so one engine can drive any number of independent
/// transactions.
pub struct Engine {
    rules: Arc<RuleSet>,
    decider: Arc<dyn DecisionProvider>,
    executor: Arc<dyn ActionExecutor>,
}

impl Engine {
    pub fn new(
        rules: Arc<RuleSet>,
        decider: Arc<dyn DecisionProvider>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        info!(
            states = rules.state_count(),
            transitions = rules.transition_count(),
            decider = decider.name(),
            executor = executor.name(),
            "Engine initialized"
        );
        Self {
            rules,
            decider,
            executor,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Begin a transaction against this engine's rules
    pub fn start(&self, now: DateTime<Local>) -> Transaction {
        Transaction::start(&self.rules, now)
    }

    /// Run one atomic tick
    ///
    /// Order: terminal check, idle timer reconciliation, timer poll,
    /// decision, resolution, action dispatch. An expired timer replaces
    /// `input` for this tick. The idle timer is reconciled again before
    /// returning, so it is armed exactly while the transaction sits in the
    /// idle state. Never fails.
    pub async fn tick(
        &self,
        txn: &mut Transaction,
        input: Option<Input>,
        now: DateTime<Local>,
    ) -> TickOutcome {
        let from = txn.state.clone();

        if self.rules.is_terminal(&from) {
            return self.settled(txn, Resolution::Halted);
        }

        self.reconcile_idle_timer(txn, now);

        let (event, input) = match txn.ctx.poll_expired(now) {
            Some(timer) => {
                if let Some(dropped) = &input {
                    debug!(transaction_id = %txn.id, input = ?dropped, timer = %timer, "Timer expiry replaces input");
                }
                (Some(Event::timeout(&timer)), Input::system(timeout_key(&timer)))
            }
            None => match input {
                Some(input) => (None, input),
                None => return self.settled(txn, Resolution::Idle),
            },
        };

        let decision = if event.is_some() || input.is_system_signal() {
            None
        } else if self.rules.is_device_driven(&from) {
            Some(Decision::no_op())
        } else {
            Some(self.classify(txn, &input).await)
        };

        let event = match (event, &input.signal, &decision) {
            (Some(timeout), _, _) => timeout,
            (None, Some(signal), _) => Event::signal(signal),
            (None, None, decision) => decision.clone().unwrap_or_else(Decision::no_op).into_event(),
        };

        let resolved = resolve(&self.rules, &from, &event, decision.as_ref(), &mut txn.ctx, now);
        txn.state = resolved.to.clone();

        let params = match (&decision, &event) {
            (Some(d), _) => d.params.clone(),
            (None, Event::Intent { params, .. }) => params.clone(),
            _ => Params::new(),
        };
        let actions: Vec<_> = resolved
            .actions
            .iter()
            .map(|a| render_action(a, &params))
            .collect();

        let signal = dispatch(&actions, self.executor.as_ref(), &mut txn.ctx, now).await;
        self.reconcile_idle_timer(txn, now);

        let next_input = match signal {
            Some(signal) => Some(Input::system(signal)),
            None => {
                if input.is_voice()
                    && let Some(idle) = self.rules.idle()
                    && txn.state == idle.state
                {
                    txn.ctx.set_timer(&idle.timer, idle.secs, now);
                }
                None
            }
        };

        let outcome = TickOutcome {
            transaction_id: txn.id.clone(),
            from,
            to: txn.state.clone(),
            event: Some(event),
            decision,
            resolution: resolved.resolution,
            actions,
            next_input,
        };
        log_outcome(&outcome, resolved.key.as_deref());
        outcome
    }

    /// Tick until no synthetic input remains
    ///
    /// Follows `next_input` hints until none is left, a terminal state is
    /// reached, or `max_chain` ticks have run. Returns every outcome, the
    /// first tick included even when it was idle.
    pub async fn run_until_settled(
        &self,
        txn: &mut Transaction,
        input: Option<Input>,
        now: DateTime<Local>,
        max_chain: u32,
    ) -> Vec<TickOutcome> {
        let mut outcomes = Vec::new();
        let mut input = input;

        loop {
            let outcome = self.tick(txn, input, now).await;
            input = outcome.next_input.clone();
            outcomes.push(outcome);

            if input.is_none() || txn.is_finished(&self.rules) {
                break;
            }
            if outcomes.len() >= max_chain.max(1) as usize {
                warn!(
                    transaction_id = %txn.id,
                    state = %txn.state,
                    max_chain,
                    "Chain limit reached, dropping synthetic input"
                );
                break;
            }
        }

        outcomes
    }

    /// Ask the Decision Provider; errors degrade to a `cancel` decision
    async fn classify(&self, txn: &Transaction, input: &Input) -> Decision {
        let request = DecisionRequest {
            state: txn.state.clone(),
            allowed_intents: self.rules.allowed_events(&txn.state),
            input: input.clone(),
            prompt: self.rules.prompt(&txn.state).cloned(),
            counters: txn.ctx.counters_snapshot(),
            flags: txn.ctx.flags_snapshot(),
        };

        match self.decider.decide(&request).await {
            Ok(decision) => {
                trace!(
                    transaction_id = %txn.id,
                    state = %txn.state,
                    intent = %decision.intent,
                    params = ?decision.params,
                    "Decision received"
                );
                decision
            }
            Err(e) => {
                warn!(
                    transaction_id = %txn.id,
                    state = %txn.state,
                    decider = self.decider.name(),
                    error = %e,
                    "Decision Provider failed, cancelling"
                );
                Decision::cancel(e.to_string())
            }
        }
    }

    fn reconcile_idle_timer(&self, txn: &mut Transaction, now: DateTime<Local>) {
        let Some(idle) = self.rules.idle() else {
            return;
        };
        let armed = txn.ctx.timers().is_active(&idle.timer);

        if txn.state == idle.state && !armed {
            txn.ctx.set_timer(&idle.timer, idle.secs, now);
        } else if txn.state != idle.state && armed {
            txn.ctx.clear_timer(&idle.timer);
        }
    }

    fn settled(&self, txn: &Transaction, resolution: Resolution) -> TickOutcome {
        trace!(transaction_id = %txn.id, state = %txn.state, resolution = resolution.as_str(), "Nothing to do");
        TickOutcome {
            transaction_id: txn.id.clone(),
            from: txn.state.clone(),
            to: txn.state.clone(),
            event: None,
            decision: None,
            resolution,
            actions: Vec::new(),
            next_input: None,
        }
    }
}

fn log_outcome(outcome: &TickOutcome, key: Option<&str>) {
    let event = outcome.event.as_ref().map(ToString::to_string).unwrap_or_default();

    if outcome.changed_state() {
        info!(
            transaction_id = %outcome.transaction_id,
            from = %outcome.from,
            to = %outcome.to,
            event = %event,
            key = key.unwrap_or("-"),
            resolution = outcome.resolution.as_str(),
            "State changed"
        );
    } else {
        debug!(
            transaction_id = %outcome.transaction_id,
            state = %outcome.to,
            event = %event,
            key = key.unwrap_or("-"),
            resolution = outcome.resolution.as_str(),
            "Tick resolved in place"
        );
    }

    for action in &outcome.actions {
        trace!(transaction_id = %outcome.transaction_id, action = %action, args = ?action.args, "Action emitted");
    }
    if let Some(next) = &outcome.next_input {
        debug!(transaction_id = %outcome.transaction_id, signal = ?next.signal, "Chaining synthetic input");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teller_api::{ActionKind, ActionSpec};
    use teller_host_api::{ContextAccess, MockExecutor, ScriptedDecider};

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
        to = "PRINTING"
        actions = [
            { kind = "api", name = "print_card" },
            { kind = "clock", name = "start_timer", args = { state = "PRINTING", secs = 60 } },
        ]

        [states.START.on.go_otp]
        to = "OTP"

        [states.START.on.cancel]
        to = "CANCELLED"

        [states.PRINTING]
        device_driven = true

        [states.PRINTING.on.printed]
        to = "CARD_PICKUP"
        actions = [
            { kind = "clock", name = "cancel_timer", args = { state = "PRINTING" } },
            { kind = "clock", name = "start_timer", args = { state = "CARD_PICKUP", secs = 45 } },
        ]

        [states.PRINTING.on._timeout_PRINTING]
        to = "FAILED"

        [states.PRINTING.on._no_op]

        [states.CARD_PICKUP]
        device_driven = true

        [states.CARD_PICKUP.on.card_taken]
        to = "DONE"

        [states.CARD_PICKUP.on._timeout_CARD_PICKUP]
        to = "CARD_PICKUP"
        actions = [{ kind = "api", name = "retract_card" }]

        [states.CARD_PICKUP.on.timeout_retract]
        to = "RETRACTED"

        [states.OTP.on.provide_otp]
        actions = [{ kind = "api", name = "verify_otp", args = { otp = "{{params.otp}}" } }]

        [states.OTP.on.otp_ok]
        to = "DONE"

        [states.OTP.on.otp_wrong]
        guard = "otp_fail < 5"
        after = "otp_fail += 1"
        fallback = { to = "FAILED" }

        [states.OTP.on.loop]
        actions = [{ kind = "api", name = "echo" }]

        [states.OTP.on._timeout_no_input]
        actions = [{ kind = "tts", name = "speak", args = { text = "Vui lòng đọc mã OTP" } }]

        [states.DONE]
        terminal = true

        [states.RETRACTED]
        terminal = true

        [states.CANCELLED]
        terminal = true

        [states.FAILED]
        terminal = true
    "#;

    fn at(s: &str) -> DateTime<Local> {
        teller_util::parse_mock_time(s).unwrap()
    }

    fn engine(decider: ScriptedDecider, executor: MockExecutor) -> Engine {
        let rules = teller_config::parse_config(RULES).unwrap().rules;
        Engine::new(Arc::new(rules), Arc::new(decider), Arc::new(executor))
    }

    #[tokio::test]
    async fn voice_input_is_classified() {
        let decider = ScriptedDecider::fixed("cancel");
        let engine = engine(decider.clone(), MockExecutor::new());
        let now = at("2025-06-01 09:00:00");
        let mut txn = engine.start(now);

        let outcome = engine.tick(&mut txn, Some(Input::voice("thôi bỏ đi")), now).await;
        assert_eq!(outcome.to, "CANCELLED");
        assert_eq!(outcome.resolution, Resolution::Transitioned);

        let requests = decider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].state, "START");
        assert_eq!(requests[0].allowed_intents, vec!["cancel", "go_otp", "reissue_card"]);
        assert_eq!(requests[0].raw_input(), "thôi bỏ đi");
        assert_eq!(requests[0].counters["otp_fail"], 0);
    }

    #[tokio::test]
    async fn terminal_state_is_absorbing() {
        let engine = engine(ScriptedDecider::fixed("cancel"), MockExecutor::new());
        let now = at("2025-06-01 09:00:00");
        let mut txn = engine.start(now);
        txn.state = "DONE".into();

        let outcome = engine.tick(&mut txn, Some(Input::system("printed")), now).await;
        assert_eq!(outcome.resolution, Resolution::Halted);
        assert_eq!(outcome.to, "DONE");
        assert!(outcome.actions.is_empty());
    }

    #[tokio::test]
    async fn no_input_and_no_timer_is_idle() {
        let engine = engine(ScriptedDecider::new(), MockExecutor::new());
        let now = at("2025-06-01 09:00:00");
        let mut txn = engine.start(now);
        let before = txn.clone();

        let outcome = engine.tick(&mut txn, None, now).await;
        assert_eq!(outcome.resolution, Resolution::Idle);
        assert_eq!(txn, before);
    }

    #[tokio::test]
    async fn system_signals_and_device_states_bypass_classifier() {
        let decider = ScriptedDecider::new();
        let executor = MockExecutor::new();
        let engine = engine(decider.clone(), executor.clone());
        let now = at("2025-06-01 09:00:00");
        let mut txn = engine.start(now);

        let outcome = engine.tick(&mut txn, Some(Input::system("reissue_card")), now).await;
        assert_eq!(outcome.to, "PRINTING");
        assert!(outcome.decision.is_none());
        assert!(txn.ctx.timers().is_active("PRINTING"));
        assert_eq!(executor.dispatched_keys(), vec!["api/print_card"]);

        let outcome = engine.tick(&mut txn, Some(Input::voice("in nhanh lên")), now).await;
        assert_eq!(outcome.to, "PRINTING");
        assert_eq!(outcome.decision.unwrap().intent, teller_api::NO_OP_INTENT);

        assert!(decider.requests().is_empty());
    }

    #[tokio::test]
    async fn provider_error_becomes_cancel() {
        let engine = engine(ScriptedDecider::new(), MockExecutor::new());
        let now = at("2025-06-01 09:00:00");
        let mut txn = engine.start(now);

        let outcome = engine.tick(&mut txn, Some(Input::voice("alo")), now).await;
        let decision = outcome.decision.unwrap();
        assert_eq!(decision.intent, "cancel");
        assert!(decision.meta.is_some());
        assert_eq!(outcome.to, "CANCELLED");
    }

    #[tokio::test]
    async fn pickup_deadline_retracts_card() {
        let executor = MockExecutor::new().with_signal("api/retract_card", "timeout_retract");
        let engine = engine(ScriptedDecider::new(), executor.clone());
        let start = at("2025-06-01 09:00:00");
        let mut txn = engine.start(start);

        engine.tick(&mut txn, Some(Input::system("reissue_card")), start).await;
        engine.tick(&mut txn, Some(Input::system("printed")), start).await;
        assert_eq!(txn.state, "CARD_PICKUP");
        assert!(!txn.ctx.timers().is_active("PRINTING"));
        assert!(txn.ctx.timers().is_active("CARD_PICKUP"));

        let quiet = engine.tick(&mut txn, None, at("2025-06-01 09:00:44")).await;
        assert_eq!(quiet.resolution, Resolution::Idle);

        let outcomes = engine
            .run_until_settled(&mut txn, None, at("2025-06-01 09:00:46"), 8)
            .await;
        assert_eq!(outcomes[0].event, Some(Event::timeout("CARD_PICKUP")));
        assert_eq!(
            outcomes[0].actions,
            vec![ActionSpec::new(ActionKind::Api, "retract_card")]
        );
        assert_eq!(txn.state, "RETRACTED");
        assert_eq!(outcomes.last().unwrap().to, "RETRACTED");
    }

    #[tokio::test]
    async fn otp_verification_chains_without_external_input() {
        let decider = ScriptedDecider::new()
            .with_decision(Decision::new("go_otp"))
            .with_decision(Decision::new("provide_otp").with_param("otp", "482913"));
        let executor = MockExecutor::new().with_signal("api/verify_otp", "otp_ok");
        let engine = engine(decider, executor.clone());
        let now = at("2025-06-01 09:00:00");
        let mut txn = engine.start(now);

        engine.tick(&mut txn, Some(Input::voice("nhập OTP")), now).await;
        assert!(txn.ctx.timers().is_active("no_input"));

        let outcomes = engine
            .run_until_settled(&mut txn, Some(Input::voice("bốn tám hai chín một ba")), now, 8)
            .await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].actions[0].args["otp"], "482913");
        assert_eq!(outcomes[0].next_input, Some(Input::system("otp_ok")));
        assert_eq!(txn.state, "DONE");
        assert!(!txn.ctx.timers().is_active("no_input"));
    }

    #[tokio::test]
    async fn otp_failures_exhaust_to_failure_state() {
        let decider = ScriptedDecider::fixed("provide_otp").with_decision(Decision::new("go_otp"));
        let executor = MockExecutor::new().with_signal("api/verify_otp", "otp_wrong");
        let engine = engine(decider, executor);
        let now = at("2025-06-01 09:00:00");
        let mut txn = engine.start(now);
        engine.tick(&mut txn, Some(Input::voice("OTP")), now).await;

        for attempt in 1..=5 {
            engine
                .run_until_settled(&mut txn, Some(Input::voice("1111")), now, 8)
                .await;
            assert_eq!(txn.state, "OTP");
            assert_eq!(txn.ctx.counter("otp_fail"), Some(attempt));
        }

        let outcomes = engine
            .run_until_settled(&mut txn, Some(Input::voice("1111")), now, 8)
            .await;
        assert_eq!(outcomes.last().unwrap().resolution, Resolution::FellBack);
        assert_eq!(txn.state, "FAILED");
        assert_eq!(txn.ctx.counter("otp_fail"), Some(5));
    }

    #[tokio::test]
    async fn voice_input_in_idle_state_rearms_idle_timer() {
        let decider = ScriptedDecider::fixed("provide_otp").with_decision(Decision::new("go_otp"));
        let engine = engine(decider, MockExecutor::new());
        let start = at("2025-06-01 09:00:00");
        let mut txn = engine.start(start);
        engine.tick(&mut txn, Some(Input::voice("OTP")), start).await;
        assert_eq!(txn.ctx.timers().deadline("no_input"), Some(at("2025-06-01 09:00:20")));

        let later = at("2025-06-01 09:00:15");
        engine.tick(&mut txn, Some(Input::voice("một hai")), later).await;
        assert_eq!(txn.ctx.timers().deadline("no_input"), Some(at("2025-06-01 09:00:35")));
    }

    #[tokio::test]
    async fn idle_timeout_reprompts_and_rearms() {
        let decider = ScriptedDecider::new().with_decision(Decision::new("go_otp"));
        let engine = engine(decider, MockExecutor::new());
        let start = at("2025-06-01 09:00:00");
        let mut txn = engine.start(start);
        engine.tick(&mut txn, Some(Input::voice("OTP")), start).await;

        let outcome = engine.tick(&mut txn, None, at("2025-06-01 09:00:21")).await;
        assert_eq!(outcome.event, Some(Event::timeout("no_input")));
        assert_eq!(outcome.actions[0].name, "speak");
        assert_eq!(txn.state, "OTP");
        assert_eq!(txn.ctx.timers().deadline("no_input"), Some(at("2025-06-01 09:00:41")));

        let quiet = engine.tick(&mut txn, None, at("2025-06-01 09:00:30")).await;
        assert_eq!(quiet.resolution, Resolution::Idle);
    }

    #[tokio::test]
    async fn chain_limit_bounds_synthetic_loops() {
        let decider = ScriptedDecider::new().with_decision(Decision::new("go_otp"));
        let executor = MockExecutor::new().with_signal("api/echo", "loop");
        let engine = engine(decider, executor);
        let now = at("2025-06-01 09:00:00");
        let mut txn = engine.start(now);
        engine.tick(&mut txn, Some(Input::voice("OTP")), now).await;

        let outcomes = engine
            .run_until_settled(&mut txn, Some(Input::system("loop")), now, 4)
            .await;
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.last().unwrap().next_input.is_some());
        assert_eq!(txn.state, "OTP");
    }

    #[tokio::test]
    async fn identical_inputs_give_identical_outcomes() {
        let now = at("2025-06-01 09:00:00");
        let run = move || async move {
            let decider = ScriptedDecider::fixed("provide_otp").with_decision(Decision::new("go_otp"));
            let executor = MockExecutor::new().with_signal("api/verify_otp", "otp_wrong");
            let engine = engine(decider, executor);
            let mut txn = engine.start(now);
            let mut outcomes = engine.run_until_settled(&mut txn, Some(Input::voice("OTP")), now, 8).await;
            outcomes.extend(engine.run_until_settled(&mut txn, Some(Input::voice("1")), now, 8).await);
            let trace: Vec<_> = outcomes
                .into_iter()
                .map(|o| (o.from, o.to, o.resolution, o.actions, o.next_input))
                .collect();
            (trace, txn.ctx)
        };

        assert_eq!(run().await, run().await);
    }
}
