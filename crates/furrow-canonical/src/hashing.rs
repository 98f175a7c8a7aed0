//! Content digests with domain-separated hashing.
//!
//! A content digest is `sha256(domain_separator || canonical_bytes(value))`,
//! where the listed self-referential fields are removed from the value before
//! it is canonicalized.

use crate::{CanonicalizationError, Digest};
use serde::Serialize;
use serde_json::Value;

/// Domain separator for event identifiers: `b"furrow:event:v1\0"`.
pub const EVENT_DOMAIN_SEPARATOR: &[u8] = b"furrow:event:v1\0";

/// Domain separator for audit block hashes: `b"furrow:audit:v1\0"`.
pub const AUDIT_DOMAIN_SEPARATOR: &[u8] = b"furrow:audit:v1\0";

/// Seed hashed to produce the `previous_hash` of the first audit block.
pub const AUDIT_GENESIS_SEED: &[u8] = b"furrow:audit:genesis:v1";

/// Error during content digest computation.
#[derive(thiserror::Error, Debug)]
pub enum DigestError {
    /// Serialization failed.
    #[error("serialization failed: {0}")]
    Serialization(String),
    /// Canonicalization failed.
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}

/// Computes `sha256(domain || canonical_bytes(value without excluded))`.
///
/// `excluded` names top-level fields that must not influence the digest,
/// typically the field the digest will be stored in.
///
/// # Example
///
/// ```rust
/// use furrow_canonical::{content_digest, EVENT_DOMAIN_SEPARATOR};
/// use serde_json::json;
///
/// let a = json!({"id": "x", "epc_list": ["urn:epc:id:sgtin:0614141.107346.1"]});
/// let b = json!({"id": "y", "epc_list": ["urn:epc:id:sgtin:0614141.107346.1"]});
/// let da = content_digest(EVENT_DOMAIN_SEPARATOR, &a, &["id"])?;
/// let db = content_digest(EVENT_DOMAIN_SEPARATOR, &b, &["id"])?;
/// assert_eq!(da, db);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn content_digest<T: Serialize + ?Sized>(
    domain: &[u8],
    value: &T,
    excluded: &[&str],
) -> Result<Digest, DigestError> {
    let mut tree: Value =
        serde_json::to_value(value).map_err(|e| DigestError::Serialization(e.to_string()))?;

    if let Value::Object(map) = &mut tree {
        for field in excluded {
            map.remove(*field);
        }
    }

    let bytes = crate::canonical_bytes(&tree)?;
    Ok(Digest::sha256(domain, &bytes))
}

/// Digest used as `previous_hash` by the first block of an audit chain.
pub fn audit_genesis_digest() -> Digest {
    Digest::sha256(b"", AUDIT_GENESIS_SEED)
}
