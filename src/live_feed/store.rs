//! Holder of the one published snapshot.
//!
//! Readers load the current `Arc<Snapshot>` without locking; a publish swaps
//! the pointer, so a reader sees either the old or the new snapshot in full.
//! Writers are expected to be serialized by the caller.

use arc_swap::ArcSwap;
use chrono::Utc;
use std::sync::Arc;

use super::models::Snapshot;

pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        SnapshotStore {
            current: ArcSwap::from_pointee(Snapshot::empty(Utc::now())),
        }
    }

    pub fn read(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn publish(&self, snapshot: Snapshot) {
        self.current.store(Arc::new(snapshot));
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
