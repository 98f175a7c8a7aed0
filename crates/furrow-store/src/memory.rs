use chrono::{DateTime, Utc};
use furrow_canonical::{Epc, EventId};
use furrow_core::{
    AuditBlock, AuditError, AuditLog, BackendError, Change, CommitError, Event, EventQuery,
    EventStore,
};
use parking_lot::Mutex;

use crate::state::StoreState;

/// Volatile Event Store. All mutations serialize on one lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn event_count(&self) -> usize {
        self.state.lock().event_count()
    }

    /// Number of audit blocks.
    pub fn block_count(&self) -> usize {
        self.state.lock().block_count()
    }

    /// Mutable access to stored blocks, for exercising verification against
    /// tampered data. Only built with the `testing` feature.
    #[cfg(feature = "testing")]
    pub fn with_blocks_mut<R>(&self, f: impl FnOnce(&mut [AuditBlock]) -> R) -> R {
        let mut state = self.state.lock();
        f(state.blocks_mut())
    }
}

impl EventQuery for MemoryStore {
    fn events_carrying(&self, epc: &Epc) -> Result<Vec<Event>, BackendError> {
        Ok(self.state.lock().carrying(epc))
    }

    fn events_between(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>, BackendError> {
        Ok(self.state.lock().between(after, before))
    }

    fn event(&self, id: &EventId) -> Result<Option<Event>, BackendError> {
        Ok(self.state.lock().event(id).cloned())
    }

    fn lineage_index(&self, epc: &Epc) -> Result<Option<Vec<Event>>, BackendError> {
        Ok(Some(self.state.lock().lineage(epc)))
    }
}

impl AuditLog for MemoryStore {
    fn append_next(
        &self,
        seal: &mut dyn FnMut(Option<&AuditBlock>) -> Result<AuditBlock, AuditError>,
    ) -> Result<AuditBlock, AuditError> {
        self.state.lock().append_block(seal, &mut |_| Ok(()))
    }

    fn blocks(&self) -> Result<Vec<AuditBlock>, BackendError> {
        Ok(self.state.lock().blocks().to_vec())
    }
}

impl EventStore for MemoryStore {
    fn commit(
        &self,
        change: Change,
        seal: &mut dyn FnMut(&Event, Option<&AuditBlock>) -> Result<AuditBlock, AuditError>,
    ) -> Result<(Event, AuditBlock), CommitError> {
        self.state.lock().commit(change, seal, &mut |_| Ok(()))
    }
}
