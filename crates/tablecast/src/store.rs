//! In-memory event buffer with a processed-set.
//!
//! The store owns every decoded event between capture and reclamation. One
//! lock guards both the per-table sequences and the processed map so the
//! two can never drift; `list` returns snapshot clones so iteration (and
//! the `on_event` calls it feeds) happens outside the lock.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::event::{ChangeEvent, SourceTable};

#[derive(Default)]
struct StoreState {
    /// Insertion-ordered events per source table; insertion order equals id
    /// order because the gateway feeds rows id-ascending.
    by_table:  HashMap<SourceTable, Vec<ChangeEvent>>,
    /// Event id -> processed flag. Absent and `false` both mean unprocessed.
    processed: HashMap<i64, bool>,
}

/// Thread-safe per-table buffer of decoded events
#[derive(Default)]
pub struct EventStore {
    state: RwLock<StoreState>,
}

impl EventStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer one event as unprocessed.
    ///
    /// Returns `false` without re-inserting when the id is already held;
    /// the gateway should not re-deliver within one process lifetime, but
    /// the store tolerates it.
    pub fn store(&self, event: ChangeEvent) -> bool {
        let mut state = self.state.write();
        if state.processed.contains_key(&event.id()) {
            return false;
        }
        state.processed.insert(event.id(), false);
        state.by_table.entry(event.table()).or_default().push(event);
        true
    }

    /// The first `limit` unprocessed events for `table`, in id order.
    ///
    /// Processed events are skipped but not removed; removal is
    /// [`EventStore::reclaim`]'s job.
    #[must_use]
    pub fn list(&self, table: SourceTable, limit: usize) -> Vec<ChangeEvent> {
        let state = self.state.read();
        state
            .by_table
            .get(&table)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| !state.processed.get(&e.id()).copied().unwrap_or(false))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mark one event id as processed. Idempotent.
    pub fn mark_processed(&self, event_id: i64) {
        self.state.write().processed.insert(event_id, true);
    }

    /// Check whether an id is currently marked processed
    #[must_use]
    pub fn is_processed(&self, event_id: i64) -> bool {
        self.state.read().processed.get(&event_id).copied().unwrap_or(false)
    }

    /// Drop every processed event and its processed-map entry.
    ///
    /// Returns the number of events reclaimed. Idempotent; runs on a fixed
    /// cadence driven by the scheduler.
    pub fn reclaim(&self) -> usize {
        let mut state = self.state.write();
        let mut reclaimed = 0;

        let StoreState {
            by_table,
            processed,
        } = &mut *state;

        for events in by_table.values_mut() {
            let before = events.len();
            events.retain(|e| !processed.get(&e.id()).copied().unwrap_or(false));
            reclaimed += before - events.len();
        }
        by_table.retain(|_, events| !events.is_empty());
        processed.retain(|_, done| !*done);

        reclaimed
    }

    /// Length of the stored sequence per table (processed included)
    #[must_use]
    pub fn count_by_table(&self) -> HashMap<SourceTable, usize> {
        self.state
            .read()
            .by_table
            .iter()
            .map(|(table, events)| (*table, events.len()))
            .collect()
    }

    /// Clear everything. Test/admin hook.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.by_table.clear();
        state.processed.clear();
    }
}
