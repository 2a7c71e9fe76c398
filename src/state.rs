//! # Shared State Store
//!
//! Single source of truth for the latest [`ArrivalSnapshot`] and the selected row.
//!
//! Every operation takes the same lock, so a reader never sees a snapshot paired
//! with an index that was computed against a different snapshot. The lock is a
//! plain `std::sync::Mutex`: critical sections only swap an `Arc` and an integer,
//! and no caller holds the guard across an `.await` or an adapter call.

use crate::ArrivalSnapshot;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The snapshot and selection as seen by one reader at one instant.
#[derive(Debug, Clone)]
pub struct DisplayState {
    pub snapshot: Arc<ArrivalSnapshot>,
    /// In `[0, snapshot.len())`, or 0 when the snapshot is empty
    pub index: usize,
}

/// Mutex-guarded [`DisplayState`] shared by the loops.
#[derive(Debug)]
pub struct SharedState {
    inner: Mutex<DisplayState>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    /// Empty snapshot, index 0.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DisplayState {
                snapshot: Arc::new(ArrivalSnapshot::empty()),
                index: 0,
            }),
        }
    }

    /// Replace the snapshot and re-clamp the selection to its length.
    pub fn publish(&self, snapshot: ArrivalSnapshot) {
        let snapshot = Arc::new(snapshot);
        let mut state = self.lock();
        state.index = clamp(state.index, snapshot.len());
        state.snapshot = snapshot;
    }

    /// Consistent point-in-time copy of snapshot and index.
    pub fn read(&self) -> DisplayState {
        self.lock().clone()
    }

    /// Move the selection to the next record, wrapping at the end.
    pub fn advance_index(&self) -> usize {
        let mut state = self.lock();
        state.index = (state.index + 1) % state.snapshot.len().max(1);
        state.index
    }

    /// Select `index`, clamped to the current snapshot. Returns the stored index.
    pub fn set_index(&self, index: usize) -> usize {
        let mut state = self.lock();
        state.index = clamp(index, state.snapshot.len());
        state.index
    }

    // A panic while holding the guard cannot leave the state half-written
    // (both fields are replaced by plain assignments), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn clamp(index: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        index.min(len - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArrivalRecord;

    fn snapshot(n: usize) -> ArrivalSnapshot {
        ArrivalSnapshot::new(
            (0..n)
                .map(|i| ArrivalRecord::new(format!("R{i}"), "Somewhere", Some(i as u32)))
                .collect(),
        )
    }

    #[test]
    fn starts_empty_at_index_zero() {
        let store = SharedState::new();
        let state = store.read();
        assert!(state.snapshot.is_empty());
        assert_eq!(state.index, 0);
    }

    #[test]
    fn publish_reclamps_index_to_shorter_snapshot() {
        let store = SharedState::new();
        store.publish(snapshot(5));
        assert_eq!(store.set_index(4), 4);

        store.publish(snapshot(2));
        assert_eq!(store.read().index, 1);

        store.publish(snapshot(0));
        assert_eq!(store.read().index, 0);
    }

    #[test]
    fn publish_keeps_index_when_still_in_range() {
        let store = SharedState::new();
        store.publish(snapshot(3));
        store.set_index(1);
        store.publish(snapshot(4));
        assert_eq!(store.read().index, 1);
    }

    #[test]
    fn index_never_escapes_snapshot_for_any_publish_sequence() {
        let store = SharedState::new();
        let lengths = [3, 0, 7, 1, 4, 4, 0, 2, 9, 1];
        for (step, &len) in lengths.iter().enumerate() {
            for _ in 0..step {
                store.advance_index();
            }
            store.set_index(step * 3);
            store.publish(snapshot(len));

            let state = store.read();
            if state.snapshot.is_empty() {
                assert_eq!(state.index, 0);
            } else {
                assert!(state.index < state.snapshot.len());
            }
        }
    }

    #[test]
    fn advance_is_cyclic_over_snapshot_length() {
        let store = SharedState::new();
        store.publish(snapshot(4));
        store.set_index(2);

        let visited: Vec<usize> = (0..4).map(|_| store.advance_index()).collect();
        assert_eq!(visited, vec![3, 0, 1, 2]);
        assert_eq!(store.read().index, 2);
    }

    #[test]
    fn advance_on_empty_snapshot_stays_at_zero() {
        let store = SharedState::new();
        assert_eq!(store.advance_index(), 0);
        assert_eq!(store.advance_index(), 0);
    }

    #[test]
    fn set_index_clamps() {
        let store = SharedState::new();
        store.publish(snapshot(3));
        assert_eq!(store.set_index(10), 2);
        assert_eq!(store.set_index(0), 0);
    }

    #[test]
    fn concurrent_publish_and_advance_stay_consistent() {
        let store = Arc::new(SharedState::new());
        let mut handles = Vec::new();

        for t in 0..4 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for i in 0..500 {
                    if t % 2 == 0 {
                        store.publish(snapshot((i + t) % 6));
                    } else {
                        store.advance_index();
                    }
                    let state = store.read();
                    assert!(state.index < state.snapshot.len().max(1));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
