use furrow_canonical::EventId;
use furrow_core::{AuditBlock, Event};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry inside a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    /// A newly stored event.
    Event(Event),
    /// `metadata[key] = value` on a stored event.
    Annotation {
        /// Target event.
        event_id: EventId,
        /// Metadata key.
        key: String,
        /// New value.
        value: Value,
    },
    /// Audit block sealed for the same mutation.
    AuditBlock(AuditBlock),
}

/// Payload of a commit frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// Records applied together.
    pub records: Vec<Record>,
}

#[derive(Serialize)]
pub(crate) struct CommitRef<'a> {
    pub(crate) records: &'a [Record],
}
