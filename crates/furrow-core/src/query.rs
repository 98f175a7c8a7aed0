//! Read-side contract of the external Event Store.

use chrono::{DateTime, Utc};
use furrow_canonical::{Epc, EventId};

use crate::events::Event;

/// Failure reported by a storage backend, with the backend's own error kept as source.
#[derive(Debug, thiserror::Error)]
#[error("event store backend failed: {0}")]
pub struct BackendError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl BackendError {
    /// Wraps any backend error.
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }
}

/// Queries the traceback engine and recorder need from an Event Store.
pub trait EventQuery {
    /// Events whose `epc_list` or `output_epc_list` contains `epc`.
    fn events_carrying(&self, epc: &Epc) -> Result<Vec<Event>, BackendError>;

    /// Events with `after <= event_time <= before` (either bound optional).
    fn events_between(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>, BackendError>;

    /// Single event by id.
    fn event(&self, id: &EventId) -> Result<Option<Event>, BackendError>;

    /// Precomputed lineage for `epc`: every event upstream of it, if the
    /// backend maintains such an index.
    fn lineage_index(&self, _epc: &Epc) -> Result<Option<Vec<Event>>, BackendError> {
        Ok(None)
    }
}

/// Full-scan implementation for event sets already in memory (imports, tests).
impl EventQuery for [Event] {
    fn events_carrying(&self, epc: &Epc) -> Result<Vec<Event>, BackendError> {
        Ok(self.iter().filter(|e| e.carries(epc)).cloned().collect())
    }

    fn events_between(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>, BackendError> {
        Ok(self
            .iter()
            .filter(|e| after.map_or(true, |a| e.event_time >= a))
            .filter(|e| before.map_or(true, |b| e.event_time <= b))
            .cloned()
            .collect())
    }

    fn event(&self, id: &EventId) -> Result<Option<Event>, BackendError> {
        Ok(self.iter().find(|e| &e.id == id).cloned())
    }
}

impl EventQuery for Vec<Event> {
    fn events_carrying(&self, epc: &Epc) -> Result<Vec<Event>, BackendError> {
        self.as_slice().events_carrying(epc)
    }

    fn events_between(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>, BackendError> {
        self.as_slice().events_between(after, before)
    }

    fn event(&self, id: &EventId) -> Result<Option<Event>, BackendError> {
        self.as_slice().event(id)
    }
}
