//! Tick outcome types returned by the engine

use serde::{Deserialize, Serialize};
use teller_util::TransactionId;

use crate::{ActionSpec, Decision, Event, Input};

/// How a tick's event was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Guard held (or was absent); after-effect ran; moved to the declared target
    Transitioned,
    /// Guard failed without a fallback; stayed put and re-emitted the actions
    Retried,
    /// Guard failed and the fallback target was adopted
    FellBack,
    /// No transition matched; routed to the failure sink
    Unresolved,
    /// No input and no expired timer; nothing happened
    Idle,
    /// The transaction is already in a terminal state
    Halted,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transitioned => "transitioned",
            Self::Retried => "retried",
            Self::FellBack => "fell_back",
            Self::Unresolved => "unresolved",
            Self::Idle => "idle",
            Self::Halted => "halted",
        }
    }
}

/// Result of one engine tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    pub transaction_id: TransactionId,

    /// State before the tick
    pub from: String,

    /// State after the tick
    pub to: String,

    /// Event that drove the tick, if any
    pub event: Option<Event>,

    /// Decision used this tick (provider output or synthesized no-op)
    pub decision: Option<Decision>,

    pub resolution: Resolution,

    /// Rendered actions, in declared order (timer actions included)
    pub actions: Vec<ActionSpec>,

    /// Synthetic input for the next tick, if an action produced a signal
    pub next_input: Option<Input>,
}

impl TickOutcome {
    pub fn changed_state(&self) -> bool {
        self.from != self.to
    }
}
