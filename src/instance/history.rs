//! Per-instance change history
//!
//! Deltas are kept per field and in one flat, timestamped log. Every delta
//! gets a monotonically increasing index; `boundary` is the first index
//! that counts as a user change.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

use crate::value::Value;

/// What caused a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaState {
    /// Schema default written at construction
    Default,
    /// Explicit constructor argument
    Initialized,
    /// Set after construction
    Update,
}

impl DeltaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaState::Default => "default",
            DeltaState::Initialized => "initialized",
            DeltaState::Update => "update",
        }
    }
}

impl fmt::Display for DeltaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single field mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    pub state: DeltaState,
    pub old: Value,
    pub new: Value,
    pub index: usize,
}

/// A mutation in global order.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedDelta {
    pub timestamp: DateTime<Utc>,
    pub key: String,
    pub delta: Delta,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    fields: HashMap<String, Vec<Delta>>,
    log: Vec<LoggedDelta>,
    next_index: usize,
    boundary: usize,
}

impl History {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a delta, unless it undoes the field's previous delta of the
    /// same kind, in which case that delta is dropped instead. Deltas before
    /// the boundary are sealed and never dropped.
    pub(crate) fn record(&mut self, key: &str, state: DeltaState, old: Value, new: Value) {
        let boundary = self.boundary;
        let deltas = self.fields.entry(key.to_string()).or_default();
        if let Some(last) = deltas.last() {
            if last.index >= boundary && last.state == state && last.old == new {
                let undone = last.index;
                deltas.pop();
                self.log.retain(|entry| entry.delta.index != undone);
                return;
            }
        }
        let delta = Delta {
            state,
            old,
            new,
            index: self.next_index,
        };
        self.next_index += 1;
        deltas.push(delta.clone());
        self.log.push(LoggedDelta {
            timestamp: Utc::now(),
            key: key.to_string(),
            delta,
        });
    }

    /// Everything recorded so far counts as the clean state.
    pub(crate) fn seal(&mut self) {
        self.boundary = self.next_index;
    }

    pub fn boundary(&self) -> usize {
        self.boundary
    }

    pub fn changes_for(&self, key: &str) -> &[Delta] {
        self.fields.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn changes(&self) -> &[LoggedDelta] {
        &self.log
    }

    pub fn is_dirty(&self) -> bool {
        self.log.iter().any(|entry| entry.delta.index >= self.boundary)
    }

    pub fn is_field_dirty(&self, key: &str) -> bool {
        self.changes_for(key).iter().any(|d| d.index >= self.boundary)
    }

    /// Value the field held at the boundary, if any delta recorded it.
    pub(crate) fn clean_value(&self, key: &str) -> Option<&Value> {
        self.changes_for(key)
            .iter()
            .rev()
            .find(|d| d.index < self.boundary)
            .map(|d| &d.new)
    }

    /// Drops the field's deltas past the boundary.
    pub(crate) fn rewind(&mut self, key: &str) {
        let boundary = self.boundary;
        if let Some(deltas) = self.fields.get_mut(key) {
            deltas.retain(|d| d.index < boundary);
        }
        self.log
            .retain(|entry| entry.key != key || entry.delta.index < boundary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undo_prunes_previous_delta() {
        let mut h = History::new();
        h.record("f", DeltaState::Initialized, Value::Null, Value::from("a"));
        h.seal();
        h.record("f", DeltaState::Update, Value::from("a"), Value::from("b"));
        assert!(h.is_dirty());
        h.record("f", DeltaState::Update, Value::from("b"), Value::from("a"));
        assert!(!h.is_dirty());
        assert_eq!(h.changes_for("f").len(), 1);
        assert_eq!(h.changes().len(), 1);
    }

    #[test]
    fn test_sealed_delta_is_not_pruned() {
        let mut h = History::new();
        h.record("f", DeltaState::Initialized, Value::Null, Value::from("a"));
        h.seal();
        h.record("f", DeltaState::Update, Value::from("a"), Value::from("b"));
        h.seal();
        h.record("f", DeltaState::Update, Value::from("b"), Value::from("a"));
        assert!(h.is_dirty());
        assert_eq!(h.changes_for("f").len(), 3);
        assert_eq!(h.clean_value("f"), Some(&Value::from("b")));
    }

    #[test]
    fn test_different_state_is_not_pruned() {
        let mut h = History::new();
        h.record("f", DeltaState::Default, Value::Null, Value::Int(1));
        h.record("f", DeltaState::Initialized, Value::Int(1), Value::Null);
        assert_eq!(h.changes_for("f").len(), 2);
    }

    #[test]
    fn test_rewind_restores_clean_value() {
        let mut h = History::new();
        h.record("f", DeltaState::Initialized, Value::Null, Value::Int(1));
        h.seal();
        h.record("f", DeltaState::Update, Value::Int(1), Value::Int(2));
        h.record("f", DeltaState::Update, Value::Int(2), Value::Int(3));
        assert_eq!(h.clean_value("f"), Some(&Value::Int(1)));
        h.rewind("f");
        assert!(!h.is_field_dirty("f"));
        assert_eq!(h.changes().len(), 1);
    }
}
