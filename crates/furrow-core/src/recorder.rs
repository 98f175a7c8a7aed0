//! Write path: every mutation of an event is committed together with its audit block.

use chrono::Utc;
use furrow_canonical::{DigestError, EntityType, EventId, ProductKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::audit::{AuditAction, AuditBlock, AuditEntry, AuditError, AuditLog, AuditPayload};
use crate::events::{Event, EventContractError, EventType, MASS_BALANCE_METADATA_KEY};
use crate::mass_balance::{MassBalanceError, MassBalanceValidator, MassBalanceVerdict};
use crate::query::{BackendError, EventQuery};

/// Entity type used for audit blocks about events.
pub const EVENT_ENTITY_TYPE: &str = "event";

/// Mutation handed to [`EventStore::commit`].
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Store a new event. Its id must not exist yet.
    Insert(Event),
    /// Set `metadata[key] = value` on an existing event.
    Annotate {
        /// Target event.
        event_id: EventId,
        /// Metadata key.
        key: String,
        /// New value.
        value: Value,
    },
}

/// Commit failure.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// The backend failed; nothing was written.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// Sealing the audit block failed; nothing was written.
    #[error(transparent)]
    Audit(#[from] AuditError),
    /// Annotation target does not exist.
    #[error("event {0} not found")]
    UnknownEvent(EventId),
    /// Insert of an id already stored.
    #[error("event {0} already exists")]
    DuplicateEvent(EventId),
}

/// Write side of an Event Store.
pub trait EventStore: EventQuery + AuditLog {
    /// Applies `change` and appends the block built by `seal` as one atomic
    /// unit. `seal` sees the event as it will be stored and the current last
    /// block. Either both are persisted or neither is.
    fn commit(
        &self,
        change: Change,
        seal: &mut dyn FnMut(&Event, Option<&AuditBlock>) -> Result<AuditBlock, AuditError>,
    ) -> Result<(Event, AuditBlock), CommitError>;
}

/// Mass-balance parameters attached to a recorded transformation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordOptions {
    /// Conversion table key.
    pub product_type: Option<ProductKey>,
    /// Expected factor override, percent.
    pub custom_factor: Option<f64>,
    /// Band half-width override.
    pub tolerance: Option<f64>,
    /// Reason stored in the audit block.
    pub reason: String,
}

/// Verdict plus the parameters it was computed with, as kept in `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassBalanceRecord {
    /// The verdict.
    #[serde(flatten)]
    pub verdict: MassBalanceVerdict,
    /// Requested table key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<ProductKey>,
    /// Requested expected-factor override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_factor: Option<f64>,
    /// Requested tolerance override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
}

impl MassBalanceRecord {
    /// Reads the record stored on `event`, if any.
    pub fn from_event(event: &Event) -> Option<Self> {
        event
            .metadata
            .get(MASS_BALANCE_METADATA_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Stored event and the block that records it.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    /// Event as stored.
    pub event: Event,
    /// Its audit block.
    pub block: AuditBlock,
}

/// Write-path failure.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Producer contract violated.
    #[error(transparent)]
    Contract(#[from] EventContractError),
    /// Mass-balance parameters rejected.
    #[error(transparent)]
    MassBalance(#[from] MassBalanceError),
    /// Identifier derivation failed.
    #[error(transparent)]
    Digest(#[from] DigestError),
    /// Verdict could not be encoded.
    #[error("verdict encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    /// Store read failed.
    #[error(transparent)]
    Query(#[from] BackendError),
    /// Atomic write failed.
    #[error(transparent)]
    Commit(#[from] CommitError),
    /// No such event.
    #[error("event {0} not found")]
    NotFound(EventId),
}

/// Records and annotates events with audit blocks.
pub struct Recorder<'s, S: ?Sized> {
    store: &'s S,
    validator: MassBalanceValidator,
}

impl<'s, S: EventStore + ?Sized> Recorder<'s, S> {
    /// Recorder writing to `store`, scoring yields with `validator`.
    pub fn new(store: &'s S, validator: MassBalanceValidator) -> Self {
        Self { store, validator }
    }

    /// Validates, scores and stores a new event.
    ///
    /// The id is replaced with the content-derived identifier and
    /// `recorded_at` is set to now. Transformations with quantities on both
    /// sides get a [`MassBalanceRecord`] under `metadata["mass_balance"]`.
    pub fn record_event(&self, mut event: Event, options: &RecordOptions) -> Result<Recorded, RecordError> {
        event.validate()?;

        if let Some(record) = self.score(&event, options)? {
            event
                .metadata
                .insert(MASS_BALANCE_METADATA_KEY.to_string(), serde_json::to_value(record)?);
        }

        event.id = event.derive_id()?;
        let now = Utc::now();
        event.recorded_at = Some(now);

        let reason = options.reason.clone();
        let (event, block) = self.store.commit(Change::Insert(event), &mut |stored, previous| {
            let payload = creation_diff(stored, &reason)?;
            AuditBlock::seal(event_entry(stored, AuditAction::Create, payload), previous, now)
        })?;

        tracing::info!(
            event_id = %event.id,
            event_type = ?event.event_type,
            block_number = block.block_number,
            "event recorded"
        );
        Ok(Recorded { event, block })
    }

    /// Recomputes the mass-balance verdict of a stored transformation with the
    /// parameters it was recorded with and the current table.
    pub fn revalidate(&self, event_id: &EventId, reason: &str) -> Result<Recorded, RecordError> {
        let current = self
            .store
            .event(event_id)?
            .ok_or_else(|| RecordError::NotFound(event_id.clone()))?;
        if current.event_type != EventType::Transformation {
            return Err(MassBalanceError::NotTransformation(current.event_type).into());
        }

        let previous = MassBalanceRecord::from_event(&current);
        let options = RecordOptions {
            product_type: previous.as_ref().and_then(|p| p.product_type.clone()),
            custom_factor: previous.as_ref().and_then(|p| p.custom_factor),
            tolerance: previous.as_ref().and_then(|p| p.tolerance),
            reason: reason.to_string(),
        };
        let verdict = self.validator.validate_event(
            &current,
            options.product_type.as_ref(),
            options.custom_factor,
            options.tolerance,
        )?;
        let record = MassBalanceRecord {
            verdict,
            product_type: options.product_type,
            custom_factor: options.custom_factor,
            tolerance: options.tolerance,
        };

        let old = current
            .metadata
            .get(MASS_BALANCE_METADATA_KEY)
            .cloned()
            .unwrap_or(Value::Null);
        let new = serde_json::to_value(&record)?;
        let payload = AuditPayload::new(reason).with_change(
            format!("metadata.{}", MASS_BALANCE_METADATA_KEY),
            old,
            new.clone(),
        );

        let now = Utc::now();
        let change = Change::Annotate {
            event_id: event_id.clone(),
            key: MASS_BALANCE_METADATA_KEY.to_string(),
            value: new,
        };
        let (event, block) = self.store.commit(change, &mut |stored, previous| {
            AuditBlock::seal(event_entry(stored, AuditAction::Annotate, payload.clone()), previous, now)
        })?;

        tracing::info!(
            event_id = %event.id,
            valid = record.verdict.valid,
            block_number = block.block_number,
            "mass balance revalidated"
        );
        Ok(Recorded { event, block })
    }

    fn score(&self, event: &Event, options: &RecordOptions) -> Result<Option<MassBalanceRecord>, RecordError> {
        if event.event_type != EventType::Transformation {
            return Ok(None);
        }
        if event.input_quantity_list.is_empty() || event.output_quantity_list.is_empty() {
            tracing::debug!("transformation without quantities on both sides; mass balance skipped");
            return Ok(None);
        }
        let verdict = self.validator.validate_event(
            event,
            options.product_type.as_ref(),
            options.custom_factor,
            options.tolerance,
        )?;
        Ok(Some(MassBalanceRecord {
            verdict,
            product_type: options.product_type.clone(),
            custom_factor: options.custom_factor,
            tolerance: options.tolerance,
        }))
    }
}

fn event_entry(event: &Event, action_type: AuditAction, payload: AuditPayload) -> AuditEntry {
    AuditEntry {
        entity_type: EntityType::new(EVENT_ENTITY_TYPE),
        entity_id: event.id.to_string(),
        action_type,
        payload,
    }
}

/// `{field: {old: null, new: value}}` for every populated top-level field.
fn creation_diff(event: &Event, reason: &str) -> Result<AuditPayload, AuditError> {
    let fields: Map<String, Value> = match serde_json::to_value(event) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Map::new(),
        Err(e) => return Err(AuditError::Hash(DigestError::Serialization(e.to_string()))),
    };
    let mut payload = AuditPayload::new(reason);
    for (field, value) in fields {
        let empty = match &value {
            Value::Null => true,
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if !empty {
            payload = payload.with_change(field, Value::Null, value);
        }
    }
    Ok(payload)
}
