//! Per-transaction mutable state

use chrono::{DateTime, Local};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use teller_config::ContextSchema;
use teller_host_api::ContextAccess;

use crate::TimerSet;

/// Counters, flags, timers and executor slots of one transaction
///
/// Counters and flags follow the fixed schema declared in rule data and
/// are addressed by index; guards and after-effects are compiled against
/// the same schema. Owned by exactly one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionContext {
    schema: Arc<ContextSchema>,
    counters: Vec<u32>,
    flags: Vec<bool>,
    timers: TimerSet,
    slots: HashMap<String, String>,
}

impl TransactionContext {
    /// Fresh context with the schema's initial values
    pub fn new(schema: Arc<ContextSchema>) -> Self {
        Self {
            counters: schema.initial_counters(),
            flags: schema.initial_flags(),
            timers: TimerSet::new(),
            slots: HashMap::new(),
            schema,
        }
    }

    pub fn schema(&self) -> &ContextSchema {
        &self.schema
    }

    pub fn counter_at(&self, index: usize) -> u32 {
        self.counters.get(index).copied().unwrap_or_default()
    }

    pub fn set_counter_at(&mut self, index: usize, value: u32) {
        if let Some(slot) = self.counters.get_mut(index) {
            *slot = value;
        }
    }

    pub fn flag_at(&self, index: usize) -> bool {
        self.flags.get(index).copied().unwrap_or_default()
    }

    pub fn set_flag_at(&mut self, index: usize, value: bool) {
        if let Some(slot) = self.flags.get_mut(index) {
            *slot = value;
        }
    }

    /// Counter values by name, as shown to the Decision Provider
    pub fn counters_snapshot(&self) -> BTreeMap<String, u32> {
        self.schema
            .counter_names()
            .zip(self.counters.iter())
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    /// Flag values by name, as shown to the Decision Provider
    pub fn flags_snapshot(&self) -> BTreeMap<String, bool> {
        self.schema
            .flag_names()
            .zip(self.flags.iter())
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    pub fn set_timer(&mut self, name: &str, secs: u64, now: DateTime<Local>) -> DateTime<Local> {
        self.timers.set(name, secs, now)
    }

    pub fn clear_timer(&mut self, name: &str) -> bool {
        self.timers.clear(name)
    }

    pub fn poll_expired(&mut self, now: DateTime<Local>) -> Option<String> {
        self.timers.poll_expired(now)
    }
}

impl ContextAccess for TransactionContext {
    fn counter(&self, name: &str) -> Option<u32> {
        self.schema.counter_index(name).map(|i| self.counter_at(i))
    }

    fn set_counter(&mut self, name: &str, value: u32) -> bool {
        match self.schema.counter_index(name) {
            Some(index) => {
                self.set_counter_at(index, value);
                true
            }
            None => false,
        }
    }

    fn flag(&self, name: &str) -> Option<bool> {
        self.schema.flag_index(name).map(|i| self.flag_at(i))
    }

    fn set_flag(&mut self, name: &str, value: bool) -> bool {
        match self.schema.flag_index(name) {
            Some(index) => {
                self.set_flag_at(index, value);
                true
            }
            None => false,
        }
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
