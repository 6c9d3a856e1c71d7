//! Request types sent across the Decision Provider boundary

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::Input;

/// Per-state prompt configuration handed to the Decision Provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptSpec {
    #[serde(default)]
    pub system: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
}

/// Everything the Decision Provider may look at for one classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Current state name
    pub state: String,

    /// Intents the provider may return (non-reserved event keys of the state)
    pub allowed_intents: Vec<String>,

    /// The raw input being classified
    pub input: Input,

    /// State prompt, if configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptSpec>,

    /// Snapshot of transaction counters
    #[serde(default)]
    pub counters: BTreeMap<String, u32>,

    /// Snapshot of transaction flags
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

impl DecisionRequest {
    pub fn raw_input(&self) -> &str {
        self.input.payload_or_empty()
    }

    pub fn allows(&self, intent: &str) -> bool {
        self.allowed_intents.iter().any(|i| i == intent)
    }
}
