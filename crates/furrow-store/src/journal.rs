//! Journal-backed Event Store.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use furrow_canonical::{Epc, EventId};
use furrow_core::{
    AuditBlock, AuditError, AuditLog, BackendError, Change, CommitError, Event, EventQuery,
    EventStore,
};
use furrow_journal::{JournalReader, JournalWriter, ReadMode, Record, WriteOptions};
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::state::StoreState;

struct Inner {
    /// `None` when opened read-only.
    writer: Option<JournalWriter>,
    state: StoreState,
}

/// Durable Event Store over a `.frj` journal.
///
/// Opening replays every commit into memory; each mutation appends one commit
/// frame before it becomes visible. A store opened with
/// [`open_read_only`](Self::open_read_only) never touches the file after
/// replay and rejects mutations.
pub struct JournalStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

fn persist_to<'w>(
    path: &'w Path,
    mut writer: Option<&'w mut JournalWriter>,
) -> impl FnMut(&[Record]) -> Result<(), CommitError> + 'w {
    move |records: &[Record]| {
        let writer = writer
            .as_mut()
            .ok_or_else(|| CommitError::Backend(StoreError::ReadOnly(path.to_path_buf()).into()))?;
        writer
            .append_commit(records)
            .map_err(|e| CommitError::Backend(StoreError::Journal(e).into()))
    }
}

/// Replays every complete commit. Returns the state, the offset after the
/// last complete frame, and whether a torn frame followed it.
fn replay(path: &Path) -> Result<(StoreState, u64, bool), StoreError> {
    let mut reader = JournalReader::open(path, ReadMode::Permissive)?;
    let mut state = StoreState::default();
    let mut commit = 0;
    while let Some(records) = reader.read_commit()? {
        for record in records {
            state
                .apply(record)
                .map_err(|reason| StoreError::Inconsistent { commit, reason })?;
        }
        commit += 1;
    }

    tracing::info!(
        path = %path.display(),
        commits = commit,
        events = state.event_count(),
        blocks = state.block_count(),
        "journal replayed"
    );
    Ok((state, reader.position(), reader.hit_truncation()))
}

impl JournalStore {
    /// Opens or creates the journal at `path` with default write options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open_with(path, WriteOptions::default())
    }

    /// Opens or creates the journal at `path` and replays it.
    ///
    /// A torn trailing frame left by an interrupted write is cut off.
    pub fn open_with<P: AsRef<Path>>(path: P, options: WriteOptions) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut writer = JournalWriter::open(&path, options)?;
        let (state, valid_len, torn) = replay(&path)?;

        if torn {
            tracing::warn!(
                path = %path.display(),
                valid_len,
                "discarding torn trailing frame"
            );
            writer.truncate_to(valid_len)?;
        }

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                writer: Some(writer),
                state,
            }),
        })
    }

    /// Replays an existing journal without opening it for writing.
    ///
    /// A missing file is an error. A torn trailing frame is ignored and left
    /// on disk.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let (state, valid_len, torn) = replay(&path)?;
        if torn {
            tracing::warn!(
                path = %path.display(),
                valid_len,
                "ignoring torn trailing frame"
            );
        }
        Ok(Self {
            path,
            inner: Mutex::new(Inner { writer: None, state }),
        })
    }

    /// True when mutations are rejected.
    pub fn is_read_only(&self) -> bool {
        self.inner.lock().writer.is_none()
    }

    /// Journal file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored events.
    pub fn event_count(&self) -> usize {
        self.inner.lock().state.event_count()
    }

    /// Number of audit blocks.
    pub fn block_count(&self) -> usize {
        self.inner.lock().state.block_count()
    }
}

impl EventQuery for JournalStore {
    fn events_carrying(&self, epc: &Epc) -> Result<Vec<Event>, BackendError> {
        Ok(self.inner.lock().state.carrying(epc))
    }

    fn events_between(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>, BackendError> {
        Ok(self.inner.lock().state.between(after, before))
    }

    fn event(&self, id: &EventId) -> Result<Option<Event>, BackendError> {
        Ok(self.inner.lock().state.event(id).cloned())
    }

    fn lineage_index(&self, epc: &Epc) -> Result<Option<Vec<Event>>, BackendError> {
        Ok(Some(self.inner.lock().state.lineage(epc)))
    }
}

impl AuditLog for JournalStore {
    fn append_next(
        &self,
        seal: &mut dyn FnMut(Option<&AuditBlock>) -> Result<AuditBlock, AuditError>,
    ) -> Result<AuditBlock, AuditError> {
        let mut guard = self.inner.lock();
        let Inner { writer, state } = &mut *guard;
        // Bound so the persist closure drops before the guard.
        let block = state.append_block(seal, &mut persist_to(&self.path, writer.as_mut()));
        block
    }

    fn blocks(&self) -> Result<Vec<AuditBlock>, BackendError> {
        Ok(self.inner.lock().state.blocks().to_vec())
    }
}

impl EventStore for JournalStore {
    fn commit(
        &self,
        change: Change,
        seal: &mut dyn FnMut(&Event, Option<&AuditBlock>) -> Result<AuditBlock, AuditError>,
    ) -> Result<(Event, AuditBlock), CommitError> {
        let mut guard = self.inner.lock();
        let Inner { writer, state } = &mut *guard;
        let (event, block) = state.commit(change, seal, &mut persist_to(&self.path, writer.as_mut()))?;
        tracing::debug!(
            event_id = %event.id,
            block_number = block.block_number,
            journal_len = writer.as_ref().map_or(0, |w| w.len()),
            "commit written"
        );
        Ok((event, block))
    }
}
