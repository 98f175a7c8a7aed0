//! Indexed in-memory state shared by both stores.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use furrow_canonical::{Epc, EventId};
use furrow_core::{AuditBlock, AuditError, Change, CommitError, Event, EventType};
use furrow_journal::Record;

/// Events, audit blocks and the indexes over them.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    events: Vec<Event>,
    by_id: HashMap<EventId, usize>,
    by_epc: HashMap<Epc, Vec<usize>>,
    lineage: HashMap<Epc, BTreeSet<EventId>>,
    blocks: Vec<AuditBlock>,
}

pub(crate) type Persist<'a> = dyn FnMut(&[Record]) -> Result<(), CommitError> + 'a;

impl StoreState {
    pub(crate) fn event_count(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub(crate) fn event(&self, id: &EventId) -> Option<&Event> {
        self.by_id.get(id).map(|i| &self.events[*i])
    }

    pub(crate) fn carrying(&self, epc: &Epc) -> Vec<Event> {
        self.by_epc
            .get(epc)
            .map(|slots| slots.iter().map(|i| self.events[*i].clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn between(&self, after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| after.map_or(true, |a| e.event_time >= a))
            .filter(|e| before.map_or(true, |b| e.event_time <= b))
            .cloned()
            .collect()
    }

    pub(crate) fn lineage(&self, epc: &Epc) -> Vec<Event> {
        self.lineage
            .get(epc)
            .map(|ids| ids.iter().filter_map(|id| self.event(id)).cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn blocks(&self) -> &[AuditBlock] {
        &self.blocks
    }

    #[cfg(feature = "testing")]
    pub(crate) fn blocks_mut(&mut self) -> &mut [AuditBlock] {
        &mut self.blocks
    }

    /// Builds the records for `change`, persists them, then applies them.
    pub(crate) fn commit(
        &mut self,
        change: Change,
        seal: &mut dyn FnMut(&Event, Option<&AuditBlock>) -> Result<AuditBlock, AuditError>,
        persist: &mut Persist<'_>,
    ) -> Result<(Event, AuditBlock), CommitError> {
        let (record, event) = match change {
            Change::Insert(event) => {
                if self.by_id.contains_key(&event.id) {
                    return Err(CommitError::DuplicateEvent(event.id));
                }
                (Record::Event(event.clone()), event)
            }
            Change::Annotate { event_id, key, value } => {
                let mut event = self
                    .event(&event_id)
                    .cloned()
                    .ok_or_else(|| CommitError::UnknownEvent(event_id.clone()))?;
                event.metadata.insert(key.clone(), value.clone());
                (Record::Annotation { event_id, key, value }, event)
            }
        };

        let block = seal(&event, self.blocks.last())?;
        let records = [record, Record::AuditBlock(block.clone())];
        persist(&records)?;

        let [record, block_record] = records;
        self.apply_checked(record);
        self.apply_checked(block_record);
        Ok((event, block))
    }

    /// Appends a block not tied to an event mutation.
    pub(crate) fn append_block(
        &mut self,
        seal: &mut dyn FnMut(Option<&AuditBlock>) -> Result<AuditBlock, AuditError>,
        persist: &mut Persist<'_>,
    ) -> Result<AuditBlock, AuditError> {
        let block = seal(self.blocks.last())?;
        let records = [Record::AuditBlock(block.clone())];
        persist(&records).map_err(|e| match e {
            CommitError::Audit(audit) => audit,
            CommitError::Backend(backend) => AuditError::Log(backend),
            other => AuditError::Log(furrow_core::BackendError::new(other)),
        })?;
        self.blocks.push(block.clone());
        Ok(block)
    }

    /// Applies a record whose consistency was established by [`commit`](Self::commit).
    fn apply_checked(&mut self, record: Record) {
        if let Err(reason) = self.apply(record) {
            tracing::error!(%reason, "validated record failed to apply");
        }
    }

    /// Applies one record, as on replay.
    pub(crate) fn apply(&mut self, record: Record) -> Result<(), String> {
        match record {
            Record::Event(event) => self.insert(event),
            Record::Annotation { event_id, key, value } => {
                let slot = *self
                    .by_id
                    .get(&event_id)
                    .ok_or_else(|| format!("annotation for unknown event {}", event_id))?;
                self.events[slot].metadata.insert(key, value);
                Ok(())
            }
            Record::AuditBlock(block) => {
                self.blocks.push(block);
                Ok(())
            }
        }
    }

    fn insert(&mut self, event: Event) -> Result<(), String> {
        if self.by_id.contains_key(&event.id) {
            return Err(format!("duplicate event {}", event.id));
        }
        let slot = self.events.len();

        let links: Vec<&Epc> = match event.event_type {
            EventType::Transformation => event.input_epc_list.iter().collect(),
            _ => event.carried_epcs().collect(),
        };
        let mut upstream: BTreeSet<EventId> = links
            .into_iter()
            .filter_map(|epc| self.lineage.get(epc))
            .flatten()
            .cloned()
            .collect();
        upstream.insert(event.id.clone());

        let carried: BTreeSet<&Epc> = event.carried_epcs().collect();
        for epc in carried {
            self.by_epc.entry(epc.clone()).or_default().push(slot);
            self.lineage
                .entry(epc.clone())
                .or_default()
                .extend(upstream.iter().cloned());
        }

        self.by_id.insert(event.id.clone(), slot);
        self.events.push(event);
        Ok(())
    }
}
