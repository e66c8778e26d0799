//! Per-document exclusive locks.
//!
//! At most one sync or migration step runs against a document at a time.
//! Locks for different documents are independent, so a worker pool can
//! process distinct documents in parallel. Entries are created on demand and
//! dropped once no holder or waiter remains.

use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::sync::Arc;

/// Table of per-document mutexes keyed by document id.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held lock for one document. Released on drop.
pub struct DocumentLock<'a> {
    table: &'a LockTable,
    id: String,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl LockTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &str) -> Arc<Mutex<()>> {
        // The map entry guard is released at the end of this statement,
        // before anyone blocks on the mutex itself.
        Arc::clone(
            &self
                .locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Block until the document's lock is acquired.
    pub fn lock(&self, id: &str) -> DocumentLock<'_> {
        let slot = self.slot(id);
        let guard = slot.lock_arc();
        DocumentLock {
            table: self,
            id: id.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of documents with a live lock entry.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for DocumentLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.table
            .locks
            .remove_if(&self.id, |_, slot| Arc::strong_count(slot) == 1);
    }
}
