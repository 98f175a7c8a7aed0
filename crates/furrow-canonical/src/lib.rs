//! Canonical primitives for Furrow traceability records.
//!
//! Every byte that participates in an event identifier or an audit block hash
//! is produced here: RFC 8785 canonical JSON, domain-separated SHA-256
//! digests, and the validated identifier newtypes carried inside records.
//!
#![deny(missing_docs)]

/// Canonical JSON encoding.
pub mod canonicalizer;
/// Digest primitives.
pub mod digest;
/// Domain-separated content hashing.
pub mod hashing;
/// Identifier newtypes (EPC, event id, entity type, product key).
pub mod identifiers;
/// Quantity items and unit normalization.
pub mod quantities;
/// Validation errors.
pub mod validation;

pub use canonicalizer::{canonical_bytes, canonical_value_bytes, CanonicalizationError};
pub use digest::{Digest, DigestAlg};
pub use hashing::{
    audit_genesis_digest, content_digest, DigestError, AUDIT_DOMAIN_SEPARATOR,
    EVENT_DOMAIN_SEPARATOR,
};
pub use identifiers::{EntityType, Epc, EpcFields, EpcKind, EventId, ProductKey};
pub use quantities::{lookup_unit, NormalizedQuantity, QuantityItem, UnitFamily};
pub use validation::ValidationError;
