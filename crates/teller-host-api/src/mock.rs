//! Test doubles for the collaborator traits

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use teller_api::{ActionOutcome, ActionSpec, Decision, DecisionRequest};

use crate::{
    ActionExecutor, ContextAccess, DecisionProvider, ExecutorError, ExecutorResult,
    ProviderError, ProviderResult,
};

/// Scripted behavior for one `kind/name` key
#[derive(Debug, Clone, Default)]
struct Script {
    /// Signals handed out one per call, before `signal`
    queued: VecDeque<String>,
    /// Signal returned once the queue is empty
    signal: Option<String>,
    /// Slot writes applied on every call
    slot_writes: Vec<(String, String)>,
    fail: bool,
}

/// Mock action executor for unit/integration testing
///
/// Records every dispatched action and returns scripted signals keyed by
/// `kind/name` (e.g. `api/verify_otp`).
#[derive(Clone, Default)]
pub struct MockExecutor {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    dispatched: Arc<Mutex<Vec<ActionSpec>>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `key` with `signal`
    pub fn with_signal(self, key: &str, signal: &str) -> Self {
        self.set_signal(key, signal);
        self
    }

    /// Answer `key` with each of `signals` in turn, then fall back to the fixed signal
    pub fn with_sequence(self, key: &str, signals: &[&str]) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(key.to_string()).or_default();
            script.queued.extend(signals.iter().map(|s| s.to_string()));
        }
        self
    }

    /// Write `value` into context slot `slot` whenever `key` runs
    pub fn with_slot_write(self, key: &str, slot: &str, value: &str) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(key.to_string()).or_default();
            script.slot_writes.push((slot.to_string(), value.to_string()));
        }
        self
    }

    /// Make `key` fail with an executor error
    pub fn with_failure(self, key: &str) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .fail = true;
        self
    }

    pub fn set_signal(&self, key: &str, signal: &str) {
        self.scripts
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .signal = Some(signal.to_string());
    }

    /// Every action dispatched so far, in order
    pub fn dispatched(&self) -> Vec<ActionSpec> {
        self.dispatched.lock().unwrap().clone()
    }

    /// `kind/name` keys of every dispatched action
    pub fn dispatched_keys(&self) -> Vec<String> {
        self.dispatched
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.to_string())
            .collect()
    }

    pub fn clear(&self) {
        self.dispatched.lock().unwrap().clear();
    }
}

#[async_trait]
impl ActionExecutor for MockExecutor {
    async fn run(
        &self,
        action: &ActionSpec,
        ctx: &mut dyn ContextAccess,
    ) -> ExecutorResult<ActionOutcome> {
        self.dispatched.lock().unwrap().push(action.clone());

        let key = action.to_string();
        let mut scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get_mut(&key) else {
            return Ok(ActionOutcome::none());
        };

        if script.fail {
            return Err(ExecutorError::Failed {
                action: key,
                message: "Mock failure".into(),
            });
        }

        for (slot, value) in &script.slot_writes {
            ctx.set_slot(slot, value.clone());
        }

        let signal = script.queued.pop_front().or_else(|| script.signal.clone());
        Ok(ActionOutcome { signal })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Scripted Decision Provider
///
/// Hands out queued decisions first, then a fixed intent if one is set.
/// With neither, returns `ProviderError::Exhausted`.
#[derive(Clone, Default)]
pub struct ScriptedDecider {
    queue: Arc<Mutex<VecDeque<Decision>>>,
    fixed: Arc<Mutex<Option<String>>>,
    requests: Arc<Mutex<Vec<DecisionRequest>>>,
}

impl ScriptedDecider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request with `intent` once the queue is empty
    pub fn fixed(intent: &str) -> Self {
        let decider = Self::default();
        *decider.fixed.lock().unwrap() = Some(intent.to_string());
        decider
    }

    pub fn with_decision(self, decision: Decision) -> Self {
        self.push(decision);
        self
    }

    pub fn push(&self, decision: Decision) {
        self.queue.lock().unwrap().push_back(decision);
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<DecisionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

#[async_trait]
impl DecisionProvider for ScriptedDecider {
    async fn decide(&self, request: &DecisionRequest) -> ProviderResult<Decision> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(decision) = self.queue.lock().unwrap().pop_front() {
            return Ok(decision);
        }

        match self.fixed.lock().unwrap().as_deref() {
            Some(intent) => Ok(Decision::new(intent)),
            None => Err(ProviderError::Exhausted),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Free-form in-memory context for exercising executors in isolation
#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    pub counters: HashMap<String, u32>,
    pub flags: HashMap<String, bool>,
    pub slots: HashMap<String, String>,
}

impl ContextAccess for MemoryContext {
    fn counter(&self, name: &str) -> Option<u32> {
        self.counters.get(name).copied()
    }

    fn set_counter(&mut self, name: &str, value: u32) -> bool {
        self.counters.insert(name.to_string(), value);
        true
    }

    fn flag(&self, name: &str) -> Option<bool> {
        self.flags.get(name).copied()
    }

    fn set_flag(&mut self, name: &str, value: bool) -> bool {
        self.flags.insert(name.to_string(), value);
        true
    }

    fn slot(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(String::as_str)
    }

    fn set_slot(&mut self, name: &str, value: String) {
        self.slots.insert(name.to_string(), value);
    }

    fn remove_slot(&mut self, name: &str) -> Option<String> {
        self.slots.remove(name)
    }
}
