//! Named per-transaction deadlines
//!
//! Timers are polled, never pushed: the caller's tick cadence bounds how
//! late an expiry is noticed.

use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use teller_util::deadline_after;

/// Outstanding timers of one transaction, keyed by name
///
/// At most one deadline exists per name; setting a name again replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerSet {
    deadlines: BTreeMap<String, DateTime<Local>>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) `name` to expire `secs` seconds after `now`
    pub fn set(&mut self, name: &str, secs: u64, now: DateTime<Local>) -> DateTime<Local> {
        let deadline = deadline_after(now, secs);
        self.deadlines.insert(name.to_string(), deadline);
        deadline
    }

    /// Disarm `name`; returns whether it was armed
    pub fn clear(&mut self, name: &str) -> bool {
        self.deadlines.remove(name).is_some()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.deadlines.contains_key(name)
    }

    pub fn deadline(&self, name: &str) -> Option<DateTime<Local>> {
        self.deadlines.get(name).copied()
    }

    /// Take at most one expired timer
    ///
    /// A timer is expired once `now >= deadline`. Among several expired
    /// timers the earliest deadline wins, then the smallest name. The
    /// returned timer is removed; the rest stay pending for the next poll.
    pub fn poll_expired(&mut self, now: DateTime<Local>) -> Option<String> {
        let name = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(name, _)| name.clone())?;

        self.deadlines.remove(&name);
        Some(name)
    }

    /// Earliest outstanding deadline, for callers choosing a sleep
    pub fn next_deadline(&self) -> Option<DateTime<Local>> {
        self.deadlines.values().min().copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.deadlines.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teller_util::parse_mock_time;

    fn at(s: &str) -> DateTime<Local> {
        parse_mock_time(s).unwrap()
    }

    #[test]
    fn set_replaces_existing_deadline() {
        let now = at("2025-06-01 09:00:00");
        let mut timers = TimerSet::new();

        timers.set("PRINTING", 30, now);
        timers.set("PRINTING", 60, now);

        assert_eq!(timers.len(), 1);
        assert_eq!(timers.deadline("PRINTING"), Some(at("2025-06-01 09:01:00")));
    }

    #[test]
    fn poll_before_and_at_deadline() {
        let now = at("2025-06-01 09:00:00");
        let mut timers = TimerSet::new();
        timers.set("CARD_PICKUP", 45, now);

        assert_eq!(timers.poll_expired(at("2025-06-01 09:00:44")), None);
        assert!(timers.is_active("CARD_PICKUP"));

        assert_eq!(
            timers.poll_expired(at("2025-06-01 09:00:45")).as_deref(),
            Some("CARD_PICKUP")
        );
        assert!(timers.is_empty());
    }

    #[test]
    fn poll_returns_one_timer_earliest_first() {
        let now = at("2025-06-01 09:00:00");
        let mut timers = TimerSet::new();
        timers.set("b_late", 20, now);
        timers.set("z_early", 10, now);
        timers.set("a_late", 20, now);

        let later = at("2025-06-01 09:05:00");
        assert_eq!(timers.poll_expired(later).as_deref(), Some("z_early"));
        assert_eq!(timers.poll_expired(later).as_deref(), Some("a_late"));
        assert_eq!(timers.poll_expired(later).as_deref(), Some("b_late"));
        assert_eq!(timers.poll_expired(later), None);
    }

    #[test]
    fn clear_and_next_deadline() {
        let now = at("2025-06-01 09:00:00");
        let mut timers = TimerSet::new();
        timers.set("no_input", 20, now);
        timers.set("PRINTING", 5, now);

        assert_eq!(timers.next_deadline(), Some(at("2025-06-01 09:00:05")));
        assert!(timers.clear("PRINTING"));
        assert!(!timers.clear("PRINTING"));
        assert_eq!(timers.next_deadline(), Some(at("2025-06-01 09:00:20")));
        assert_eq!(timers.names().collect::<Vec<_>>(), vec!["no_input"]);
    }
}
