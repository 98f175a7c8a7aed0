use chrono::{DateTime, Utc};
use furrow_canonical::{
    content_digest, DigestError, Epc, EventId, QuantityItem, ValidationError,
    EVENT_DOMAIN_SEPARATOR,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key holding the mass-balance verdict of a transformation.
pub const MASS_BALANCE_METADATA_KEY: &str = "mass_balance";

/// EPCIS event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Observation of individual objects (harvest, receiving, shipping).
    Object,
    /// Packing objects into or out of a container.
    Aggregation,
    /// Association with a business transaction (PO, invoice).
    Transaction,
    /// Inputs consumed to produce outputs.
    Transformation,
}

/// EPCIS action on the listed EPCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// EPCs enter existence or association.
    Add,
    /// EPCs were seen, nothing changed.
    Observe,
    /// EPCs leave existence or association.
    Delete,
}

/// Who produced the event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Typed in by an operator.
    #[default]
    Manual,
    /// Produced by a transcription or vision pipeline.
    Ai,
    /// Emitted by a sensor or reader.
    Iot,
    /// Bulk import from another system.
    Import,
}

fn unassigned_id() -> EventId {
    EventId::new("")
}

/// EPCIS-style event record.
///
/// Everything except `metadata` is immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Store-assigned identifier. Empty on drafts that have not been recorded.
    #[serde(default = "unassigned_id")]
    pub id: EventId,
    /// Event kind.
    pub event_type: EventType,
    /// Action; absent on transformations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// When the event happened.
    pub event_time: DateTime<Utc>,
    /// When the store accepted the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
    /// Business step (`harvesting`, `shipping`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biz_step: Option<String>,
    /// Business state of the objects afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disposition: Option<String>,
    /// EPCs the event is about.
    #[serde(default)]
    pub epc_list: Vec<Epc>,
    /// EPCs consumed by a transformation.
    #[serde(default)]
    pub input_epc_list: Vec<Epc>,
    /// EPCs produced by a transformation (or commissioned at origin).
    #[serde(default)]
    pub output_epc_list: Vec<Epc>,
    /// Class-level quantities the event is about.
    #[serde(default)]
    pub quantity_list: Vec<QuantityItem>,
    /// Quantities consumed by a transformation.
    #[serde(default)]
    pub input_quantity_list: Vec<QuantityItem>,
    /// Quantities produced by a transformation.
    #[serde(default)]
    pub output_quantity_list: Vec<QuantityItem>,
    /// Where the event was observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_point: Option<String>,
    /// Where the objects are afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biz_location: Option<String>,
    /// Producer of the record.
    #[serde(default)]
    pub source_type: SourceType,
    /// Mutable side-channel for validation verdicts.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Producer-contract violation on an incoming event.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EventContractError {
    /// Non-transformation event lists neither EPCs nor quantities.
    #[error("{0:?} event must list EPCs or quantities")]
    NothingObserved(EventType),
    /// Transformation without inputs.
    #[error("transformation event has no inputs")]
    MissingInputs,
    /// Transformation without outputs.
    #[error("transformation event has no outputs")]
    MissingOutputs,
    /// Malformed quantity or identifier.
    #[error("invalid field: {0}")]
    Field(#[from] ValidationError),
}

impl Event {
    /// Checks the shape every producer must respect before the event is stored.
    pub fn validate(&self) -> Result<(), EventContractError> {
        match self.event_type {
            EventType::Transformation => {
                if self.input_epc_list.is_empty() && self.input_quantity_list.is_empty() {
                    return Err(EventContractError::MissingInputs);
                }
                if self.output_epc_list.is_empty() && self.output_quantity_list.is_empty() {
                    return Err(EventContractError::MissingOutputs);
                }
            }
            other => {
                if self.epc_list.is_empty()
                    && self.output_epc_list.is_empty()
                    && self.quantity_list.is_empty()
                {
                    return Err(EventContractError::NothingObserved(other));
                }
            }
        }

        for epc in self.all_epcs() {
            Epc::parse(epc.as_str())?;
        }
        for quantity in self
            .quantity_list
            .iter()
            .chain(&self.input_quantity_list)
            .chain(&self.output_quantity_list)
        {
            quantity.validate()?;
        }
        Ok(())
    }

    /// Content-derived identifier: `sha256("furrow:event:v1\0" || canonical(event))`.
    ///
    /// `id`, `recorded_at` and `metadata` are excluded so the identifier only
    /// covers the immutable part of the record.
    pub fn derive_id(&self) -> Result<EventId, DigestError> {
        let digest = content_digest(
            EVENT_DOMAIN_SEPARATOR,
            self,
            &["id", "recorded_at", "metadata"],
        )?;
        Ok(EventId::new(digest.b64))
    }

    /// True when `epc` appears in `epc_list` or `output_epc_list`.
    pub fn carries(&self, epc: &Epc) -> bool {
        self.epc_list.contains(epc) || self.output_epc_list.contains(epc)
    }

    /// EPCs that identify what this event hands on downstream.
    pub fn carried_epcs(&self) -> impl Iterator<Item = &Epc> {
        self.epc_list.iter().chain(&self.output_epc_list)
    }

    /// Every EPC mentioned anywhere in the event.
    pub fn all_epcs(&self) -> impl Iterator<Item = &Epc> {
        self.epc_list
            .iter()
            .chain(&self.input_epc_list)
            .chain(&self.output_epc_list)
    }

    /// Drops read point and business location.
    pub fn without_location(mut self) -> Self {
        self.read_point = None;
        self.biz_location = None;
        self
    }
}
