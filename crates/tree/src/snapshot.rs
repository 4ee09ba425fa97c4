use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The run-level state captured at a given point in the conversation
/// (§3 "Snapshot"). Stored sparsely: only written when the state actually
/// changes, not on every message.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Snapshot {
    pub state_of_run: String,
    #[serde(default)]
    pub tool_call_facts: Vec<String>,
    #[serde(default)]
    pub handoff_context: Option<String>,
}

/// A sparse `message_index -> Snapshot` map, keyed by the position of the
/// message that produced the snapshot along the active path (§4.4.1
/// "State Context plugin").
///
/// A `BTreeMap` is used instead of a `HashMap` so "largest index <= N" can
/// be answered with a single range query instead of a linear scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotStore {
    snapshots: BTreeMap<usize, Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, message_index: usize, snapshot: Snapshot) {
        self.snapshots.insert(message_index, snapshot);
    }

    pub fn get(&self, message_index: usize) -> Option<&Snapshot> {
        self.snapshots.get(&message_index)
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Restore the snapshot in effect at `requested_index`: the entry at the
    /// largest `message_index <= requested_index`, or `None` if no snapshot
    /// has been written at or before that point yet.
    pub fn restore_at_or_before(&self, requested_index: usize) -> Option<(usize, &Snapshot)> {
        self.snapshots
            .range(..=requested_index)
            .next_back()
            .map(|(idx, snap)| (*idx, snap))
    }

    /// Drop every snapshot recorded after `message_index`, used when a
    /// branch is created and the old continuation becomes unreachable.
    pub fn truncate_after(&mut self, message_index: usize) {
        self.snapshots.split_off(&(message_index + 1));
    }

    pub fn latest(&self) -> Option<(usize, &Snapshot)> {
        self.snapshots.iter().next_back().map(|(idx, snap)| (*idx, snap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(label: &str) -> Snapshot {
        Snapshot {
            state_of_run: label.into(),
            tool_call_facts: Vec::new(),
            handoff_context: None,
        }
    }

    #[test]
    fn restore_finds_largest_index_at_or_below_request() {
        let mut store = SnapshotStore::new();
        store.insert(2, snap("a"));
        store.insert(5, snap("b"));
        store.insert(9, snap("c"));

        let (idx, s) = store.restore_at_or_before(7).unwrap();
        assert_eq!(idx, 5);
        assert_eq!(s.state_of_run, "b");
    }

    #[test]
    fn restore_exact_match() {
        let mut store = SnapshotStore::new();
        store.insert(5, snap("b"));
        let (idx, _) = store.restore_at_or_before(5).unwrap();
        assert_eq!(idx, 5);
    }

    #[test]
    fn restore_before_any_snapshot_is_none() {
        let mut store = SnapshotStore::new();
        store.insert(5, snap("b"));
        assert!(store.restore_at_or_before(2).is_none());
    }

    #[test]
    fn truncate_after_drops_future_snapshots() {
        let mut store = SnapshotStore::new();
        store.insert(2, snap("a"));
        store.insert(5, snap("b"));
        store.insert(9, snap("c"));
        store.truncate_after(5);
        assert_eq!(store.len(), 2);
        assert!(store.get(9).is_none());
    }

    #[test]
    fn sparse_store_is_empty_by_default() {
        let store = SnapshotStore::new();
        assert!(store.is_empty());
    }
}
