//! Provenance and integrity core for Furrow supply-chain records.
//!
//! This crate provides:
//! - EPCIS-style event records with content-derived identifiers
//! - Backward traceback over stored events, with a lineage-index fallback
//! - Mass-balance validation of transformations against reference yields
//! - A hash-linked audit chain over every mutation
//! - The [`EventStore`] contract storage backends implement
//!
//! Core invariants:
//! - Events are never deleted; only their `metadata` side-channel changes
//! - Every mutation and its audit block are committed atomically
//! - Verification recomputes hashes and reports, never repairs
//!
#![deny(missing_docs)]

/// Hash-linked audit chain.
pub mod audit;
/// Reference conversion factors.
pub mod conversion;
/// Aggregated error type.
pub mod errors;
/// Event records.
pub mod events;
/// Mass-balance validation.
pub mod mass_balance;
/// Read-side store contract.
pub mod query;
/// Write path.
pub mod recorder;
/// Lineage reconstruction.
pub mod traceback;

pub use audit::{
    verify_blocks, AuditAction, AuditBlock, AuditChain, AuditEntry, AuditError, AuditLog,
    AuditPayload, ChainReport, FieldChange, InvalidBlock, InvalidReason, DEFAULT_GRACE_SECS,
};
pub use conversion::{ConversionFactor, ConversionTable, ConversionTableError};
pub use errors::CoreError;
pub use events::{
    Action, Event, EventContractError, EventType, SourceType, MASS_BALANCE_METADATA_KEY,
};
pub use mass_balance::{
    ExpectedFactor, FactorSource, Finding, FindingKind, MassBalanceError, MassBalanceRequest,
    MassBalanceValidator, MassBalanceVerdict, Severity, DEFAULT_TOLERANCE_PERCENT,
};
pub use query::{BackendError, EventQuery};
pub use recorder::{
    Change, CommitError, EventStore, MassBalanceRecord, RecordError, RecordOptions, Recorded,
    Recorder, EVENT_ENTITY_TYPE,
};
pub use traceback::{
    IndexedLineage, LiveGraphWalk, Lineage, LineageSource, MaterializedIndexLookup, TraceError,
    TraceNode, TraceOptions, TraceTree, TracebackEngine, DEFAULT_MAX_DEPTH, MAX_TRACE_DEPTH,
};
