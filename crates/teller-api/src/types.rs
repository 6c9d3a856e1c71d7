//! Shared types for the teller engine

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::{CANCEL_INTENT, CANCEL_TIMER_ACTION, NO_OP_INTENT, START_TIMER_ACTION, TIMEOUT_KEY_PREFIX};

/// Decision parameters (and action argument trees) are JSON objects
pub type Params = Map<String, Value>;

/// Where an input came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Spoken customer input, classified by the Decision Provider
    Voice,
    /// Device, timer, or action-generated signal
    System,
}

/// Raw input fed into one tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub channel: Channel,

    /// Target signal name, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,

    /// Voice payload (utterance), if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl Input {
    pub fn voice(payload: impl Into<String>) -> Self {
        Self {
            channel: Channel::Voice,
            signal: None,
            payload: Some(payload.into()),
        }
    }

    pub fn system(signal: impl Into<String>) -> Self {
        Self {
            channel: Channel::System,
            signal: Some(signal.into()),
            payload: None,
        }
    }

    /// A signal with no voice payload bypasses classification in every state.
    pub fn is_system_signal(&self) -> bool {
        self.signal.is_some() && self.payload.is_none()
    }

    pub fn is_voice(&self) -> bool {
        self.channel == Channel::Voice
    }

    pub fn payload_or_empty(&self) -> &str {
        self.payload.as_deref().unwrap_or("")
    }
}

/// The single input driving one resolution step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Signal { name: String },
    Intent { name: String, params: Params },
    Timeout { timer: String },
}

impl Event {
    pub fn signal(name: impl Into<String>) -> Self {
        Self::Signal { name: name.into() }
    }

    pub fn timeout(timer: impl Into<String>) -> Self {
        Self::Timeout {
            timer: timer.into(),
        }
    }

    /// Rule-store key this event is looked up under
    pub fn key(&self) -> String {
        match self {
            Self::Signal { name } | Self::Intent { name, .. } => name.clone(),
            Self::Timeout { timer } => timeout_key(timer),
        }
    }

    /// Literal signals (timer expiry included) take precedence over intents.
    pub fn is_literal_signal(&self) -> bool {
        matches!(self, Self::Signal { .. } | Self::Timeout { .. })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal { name } => write!(f, "signal:{}", name),
            Self::Intent { name, .. } => write!(f, "intent:{}", name),
            Self::Timeout { timer } => write!(f, "timeout:{}", timer),
        }
    }
}

/// Event key synthesized when `timer` expires
pub fn timeout_key(timer: &str) -> String {
    format!("{}{}", TIMEOUT_KEY_PREFIX, timer)
}

/// Kind of reply the Decision Provider suggests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Text,
    #[default]
    None,
}

/// Reply stub attached to a decision
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecisionResponse {
    #[serde(rename = "type", default)]
    pub kind: ResponseKind,
    #[serde(default)]
    pub content: String,
}

impl DecisionResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Text,
            content: content.into(),
        }
    }
}

/// Classified intent produced by the Decision Provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub intent: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub response: DecisionResponse,
    /// Diagnostic metadata (errors, raw output); never read by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Decision {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            params: Params::new(),
            response: DecisionResponse::default(),
            meta: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Decision synthesized for device-driven states
    pub fn no_op() -> Self {
        Self::new(NO_OP_INTENT)
    }

    /// Conservative decision used when classification failed
    pub fn cancel(reason: impl Into<String>) -> Self {
        let mut meta = Map::new();
        meta.insert("error".into(), Value::String(reason.into()));
        Self {
            meta: Some(Value::Object(meta)),
            ..Self::new(CANCEL_INTENT)
        }
    }

    pub fn into_event(self) -> Event {
        Event::Intent {
            name: self.intent,
            params: self.params,
        }
    }
}

/// Action category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Ui,
    Tts,
    Api,
    Clock,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ui => "ui",
            Self::Tts => "tts",
            Self::Api => "api",
            Self::Clock => "clock",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared side effect of a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub kind: ActionKind,
    pub name: String,
    #[serde(default)]
    pub args: Params,
}

impl ActionSpec {
    pub fn new(kind: ActionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            args: Params::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Clock actions are handled by the engine, never by the executor
    pub fn is_clock(&self) -> bool {
        self.kind == ActionKind::Clock
    }

    pub fn is_start_timer(&self) -> bool {
        self.is_clock() && self.name == START_TIMER_ACTION
    }

    pub fn is_cancel_timer(&self) -> bool {
        self.is_clock() && self.name == CANCEL_TIMER_ACTION
    }

    /// String argument, if present
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }
}

impl fmt::Display for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// What the Action Executor returns for one action
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
}

impl ActionOutcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn signal(signal: impl Into<String>) -> Self {
        Self {
            signal: Some(signal.into()),
        }
    }
}
