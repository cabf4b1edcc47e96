//! Apply, commit and roll back optimistic cache patches.

use std::sync::Arc;

use tracing::debug;

use super::cache::Snapshot;
use super::client::QueryClient;
use super::key::QueryKey;

/// Where an [`OptimisticUpdate`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimisticPhase {
    /// Nothing has been patched yet.
    Idle,
    /// The cache holds patched values and a snapshot of the originals.
    Applied,
    /// The server accepted the change; the snapshot was discarded.
    Committed,
    /// The server rejected the change; the snapshot was restored.
    RolledBack,
}

/// An optimistic change to every cache entry matching a set of filters.
///
/// ```text
/// Idle --apply--> Applied --commit---> Committed
///                    |
///                    +-----rollback--> RolledBack
/// ```
///
/// `apply` may run several times while `Applied` (for example once per cached
/// value type); the snapshot keeps the value each entry had before the first
/// patch, so a rollback always returns the cache to its pre-mutation state.
/// An update dropped while `Applied` rolls back.
#[derive(Debug)]
pub struct OptimisticUpdate {
    client: Arc<QueryClient>,
    filters: Vec<QueryKey>,
    snapshot: Snapshot,
    phase: OptimisticPhase,
}

impl OptimisticUpdate {
    pub fn new(client: Arc<QueryClient>, filters: Vec<QueryKey>) -> Self {
        Self {
            client,
            filters,
            snapshot: Snapshot::default(),
            phase: OptimisticPhase::Idle,
        }
    }

    pub const fn phase(&self) -> OptimisticPhase {
        self.phase
    }

    pub fn filters(&self) -> &[QueryKey] {
        &self.filters
    }

    /// Entries captured so far.
    pub const fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Patches every matching entry that holds a `V` and cancels the in-flight
    /// fetches of the entries it changed.
    ///
    /// Returns the number of entries changed. Does nothing once the update has
    /// been committed or rolled back.
    pub fn apply<V, F>(&mut self, patch: F) -> usize
    where
        V: Clone + Send + Sync + 'static,
        F: FnMut(&mut V) -> bool,
    {
        if matches!(
            self.phase,
            OptimisticPhase::Committed | OptimisticPhase::RolledBack
        ) {
            return 0;
        }
        let snapshot = self.client.patch_queries::<V, F>(&self.filters, patch);
        let patched = snapshot.len();
        self.snapshot.merge(snapshot);
        self.phase = OptimisticPhase::Applied;
        patched
    }

    /// Keeps the patched values. Returns `false` unless the update was applied.
    pub fn commit(&mut self) -> bool {
        if self.phase != OptimisticPhase::Applied {
            return false;
        }
        self.snapshot = Snapshot::default();
        self.phase = OptimisticPhase::Committed;
        true
    }

    /// Restores every captured entry. Returns `false` unless the update was applied.
    pub fn rollback(&mut self) -> bool {
        if self.phase != OptimisticPhase::Applied {
            return false;
        }
        let snapshot = std::mem::take(&mut self.snapshot);
        debug!(entries = snapshot.len(), "rolling back optimistic update");
        self.client.restore(snapshot);
        self.phase = OptimisticPhase::RolledBack;
        true
    }
}

impl Drop for OptimisticUpdate {
    fn drop(&mut self) {
        if self.phase == OptimisticPhase::Applied {
            debug!("optimistic update dropped before settling");
            self.rollback();
        }
    }
}
