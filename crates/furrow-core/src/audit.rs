//! Hash-linked audit chain.
//!
//! Every mutation of a record produces one [`AuditBlock`]. Blocks are numbered
//! from 1; each stores the hash of its predecessor and its own hash computed
//! as `sha256("furrow:audit:v1\0" || canonical(fields))` over
//! `{block_number, entity_type, entity_id, action_type, payload, previous_hash}`.
//! The first block links to [`audit_genesis_digest`].
//!
//! Verification always recomputes hashes from stored fields. Mismatches are
//! reported, never repaired.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use furrow_canonical::{
    audit_genesis_digest, content_digest, Digest, DigestError, EntityType, AUDIT_DOMAIN_SEPARATOR,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::BackendError;

/// Default window in which an unsealed trailing block is still considered in flight.
pub const DEFAULT_GRACE_SECS: i64 = 5;

/// Kind of mutation recorded by a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Record created.
    Create,
    /// Record fields changed.
    Update,
    /// Side-channel metadata attached.
    Annotate,
    /// Record removed.
    Delete,
}

/// Before/after value of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Previous value, `null` on create.
    pub old: Value,
    /// New value, `null` on delete.
    pub new: Value,
}

/// Complete diff plus the actor's reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditPayload {
    /// Changed fields keyed by (dotted) field name.
    pub changes: BTreeMap<String, FieldChange>,
    /// Free-text justification; may be empty.
    #[serde(default)]
    pub reason: String,
}

impl AuditPayload {
    /// Payload with no changes yet.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            changes: BTreeMap::new(),
            reason: reason.into(),
        }
    }

    /// Adds one field change.
    pub fn with_change(mut self, field: impl Into<String>, old: Value, new: Value) -> Self {
        self.changes.insert(field.into(), FieldChange { old, new });
        self
    }

    /// True when the reason is empty or whitespace.
    pub fn reason_missing(&self) -> bool {
        self.reason.trim().is_empty()
    }
}

/// What a caller asks the chain to record.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    /// Entity kind, e.g. `event`.
    pub entity_type: EntityType,
    /// Entity identifier.
    pub entity_id: String,
    /// Mutation kind.
    pub action_type: AuditAction,
    /// Diff and reason.
    pub payload: AuditPayload,
}

/// One link of the audit chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditBlock {
    /// Position in the chain, starting at 1.
    pub block_number: u64,
    /// Entity kind.
    pub entity_type: EntityType,
    /// Entity identifier.
    pub entity_id: String,
    /// Mutation kind.
    pub action_type: AuditAction,
    /// Diff and reason.
    pub payload: AuditPayload,
    /// `current_hash` of the previous block, or the genesis digest.
    pub previous_hash: Digest,
    /// Hash of this block; `None` while a write is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_hash: Option<Digest>,
    /// Wall-clock time the block was sealed.
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct HashedFields<'a> {
    block_number: u64,
    entity_type: &'a EntityType,
    entity_id: &'a str,
    action_type: AuditAction,
    payload: &'a AuditPayload,
    previous_hash: &'a Digest,
}

impl AuditBlock {
    /// Builds and hashes the block that follows `previous`.
    pub fn seal(
        entry: AuditEntry,
        previous: Option<&AuditBlock>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, AuditError> {
        let (block_number, previous_hash) = match previous {
            None => (1, audit_genesis_digest()),
            Some(prev) => {
                let hash = prev
                    .current_hash
                    .clone()
                    .ok_or(AuditError::UnsealedPredecessor(prev.block_number))?;
                (prev.block_number + 1, hash)
            }
        };

        let mut block = AuditBlock {
            block_number,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            action_type: entry.action_type,
            payload: entry.payload,
            previous_hash,
            current_hash: None,
            created_at,
        };
        block.current_hash = Some(block.compute_hash()?);
        Ok(block)
    }

    /// Recomputes the hash from the stored fields.
    pub fn compute_hash(&self) -> Result<Digest, DigestError> {
        let fields = HashedFields {
            block_number: self.block_number,
            entity_type: &self.entity_type,
            entity_id: &self.entity_id,
            action_type: self.action_type,
            payload: &self.payload,
            previous_hash: &self.previous_hash,
        };
        content_digest(AUDIT_DOMAIN_SEPARATOR, &fields, &[])
    }

    /// True when the block has a hash and it matches the stored fields.
    pub fn hash_matches(&self) -> bool {
        match (&self.current_hash, self.compute_hash()) {
            (Some(stored), Ok(computed)) => *stored == computed,
            _ => false,
        }
    }
}

/// Audit chain failure.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Block hash could not be computed.
    #[error("audit hash failed: {0}")]
    Hash(#[from] DigestError),
    /// The backing log failed.
    #[error("audit log failed: {0}")]
    Log(#[from] BackendError),
    /// Tried to link to a block that has no hash yet.
    #[error("block {0} is not sealed")]
    UnsealedPredecessor(u64),
    /// Verification found a broken chain.
    #[error("audit chain integrity violated at block {block_number}")]
    ChainIntegrityViolation {
        /// First offending block.
        block_number: u64,
    },
}

/// Storage seam for audit blocks.
pub trait AuditLog {
    /// Atomically reads the last block, lets `seal` build the next one from
    /// it, and appends the result. No other append may interleave.
    fn append_next(
        &self,
        seal: &mut dyn FnMut(Option<&AuditBlock>) -> Result<AuditBlock, AuditError>,
    ) -> Result<AuditBlock, AuditError>;

    /// Snapshot of every block in chain order.
    fn blocks(&self) -> Result<Vec<AuditBlock>, BackendError>;

    /// Blocks for one entity, in chain order.
    fn trail(&self, entity_type: &EntityType, entity_id: &str) -> Result<Vec<AuditBlock>, BackendError> {
        Ok(self
            .blocks()?
            .into_iter()
            .filter(|b| &b.entity_type == entity_type && b.entity_id == entity_id)
            .collect())
    }
}

impl<T: AuditLog + ?Sized> AuditLog for &T {
    fn append_next(
        &self,
        seal: &mut dyn FnMut(Option<&AuditBlock>) -> Result<AuditBlock, AuditError>,
    ) -> Result<AuditBlock, AuditError> {
        (**self).append_next(seal)
    }

    fn blocks(&self) -> Result<Vec<AuditBlock>, BackendError> {
        (**self).blocks()
    }

    fn trail(&self, entity_type: &EntityType, entity_id: &str) -> Result<Vec<AuditBlock>, BackendError> {
        (**self).trail(entity_type, entity_id)
    }
}

/// Why a block failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InvalidReason {
    /// Stored hash differs from the recomputed one.
    HashMismatch,
    /// `previous_hash` does not equal the predecessor's hash.
    BrokenLink,
    /// `block_number` is not its position.
    OutOfSequence {
        /// Number the block should carry.
        expected: u64,
    },
    /// No hash and outside the grace window.
    Incomplete,
    /// An earlier block already failed.
    FollowsInvalidBlock {
        /// First failing block.
        first: u64,
    },
}

/// One failing block in a [`ChainReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidBlock {
    /// Block number as stored.
    pub block_number: u64,
    /// Failure reason.
    #[serde(flatten)]
    pub reason: InvalidReason,
}

/// Result of a full chain verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    /// Blocks scored (excludes an in-flight trailing block).
    pub total_blocks: u64,
    /// Blocks that verified.
    pub valid_blocks: u64,
    /// Blocks that failed.
    pub invalid_blocks: u64,
    /// Failing blocks in chain order.
    pub invalid: Vec<InvalidBlock>,
}

impl ChainReport {
    /// True when every scored block verified.
    pub fn is_intact(&self) -> bool {
        self.invalid.is_empty()
    }

    /// Converts a failing report into [`AuditError::ChainIntegrityViolation`].
    pub fn ensure_intact(&self) -> Result<(), AuditError> {
        match self.invalid.first() {
            None => Ok(()),
            Some(first) => Err(AuditError::ChainIntegrityViolation {
                block_number: first.block_number,
            }),
        }
    }
}

/// Scores `blocks` as of `now`.
///
/// A trailing block without a hash whose `created_at` lies within `grace` of
/// `now` is excluded. The first failing block invalidates every later one.
pub fn verify_blocks(blocks: &[AuditBlock], now: DateTime<Utc>, grace: Duration) -> ChainReport {
    let scored = match blocks.last() {
        Some(last) if last.current_hash.is_none() && now - last.created_at < grace => {
            tracing::debug!(block_number = last.block_number, "skipping in-flight audit block");
            &blocks[..blocks.len() - 1]
        }
        _ => blocks,
    };

    let mut report = ChainReport {
        total_blocks: scored.len() as u64,
        ..ChainReport::default()
    };
    let mut expected_previous = audit_genesis_digest();
    let mut first_failure: Option<u64> = None;

    for (position, block) in scored.iter().enumerate() {
        let position = position as u64 + 1;

        if let Some(first) = first_failure {
            report.invalid.push(InvalidBlock {
                block_number: block.block_number,
                reason: InvalidReason::FollowsInvalidBlock { first },
            });
            continue;
        }

        let failure = if block.block_number != position {
            Some(InvalidReason::OutOfSequence { expected: position })
        } else if block.current_hash.is_none() {
            Some(InvalidReason::Incomplete)
        } else if !block.hash_matches() {
            Some(InvalidReason::HashMismatch)
        } else if block.previous_hash != expected_previous {
            Some(InvalidReason::BrokenLink)
        } else {
            None
        };

        match (failure, &block.current_hash) {
            (None, Some(hash)) => {
                report.valid_blocks += 1;
                expected_previous = hash.clone();
            }
            (reason, _) => {
                let reason = reason.unwrap_or(InvalidReason::Incomplete);
                tracing::warn!(block_number = block.block_number, ?reason, "audit block failed verification");
                report.invalid.push(InvalidBlock {
                    block_number: block.block_number,
                    reason,
                });
                first_failure = Some(block.block_number);
            }
        }
    }

    report.invalid_blocks = report.invalid.len() as u64;
    report
}

/// Audit chain operations over an [`AuditLog`].
#[derive(Debug, Clone)]
pub struct AuditChain<L> {
    log: L,
    grace: Duration,
}

impl<L: AuditLog> AuditChain<L> {
    /// Chain with the default grace window.
    pub fn new(log: L) -> Self {
        Self {
            log,
            grace: Duration::seconds(DEFAULT_GRACE_SECS),
        }
    }

    /// Overrides the in-flight grace window.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Underlying log.
    pub fn log(&self) -> &L {
        &self.log
    }

    /// Appends `entry` as the next block, sealed now.
    pub fn append(&self, entry: AuditEntry) -> Result<AuditBlock, AuditError> {
        self.append_at(entry, Utc::now())
    }

    /// Appends `entry` with an explicit `created_at`.
    pub fn append_at(&self, entry: AuditEntry, created_at: DateTime<Utc>) -> Result<AuditBlock, AuditError> {
        let block = self
            .log
            .append_next(&mut |previous| AuditBlock::seal(entry.clone(), previous, created_at))?;
        tracing::debug!(
            block_number = block.block_number,
            entity_type = %block.entity_type,
            entity_id = %block.entity_id,
            "audit block appended"
        );
        Ok(block)
    }

    /// Verifies the whole chain as of now.
    pub fn verify_chain(&self) -> Result<ChainReport, AuditError> {
        self.verify_chain_at(Utc::now())
    }

    /// Verifies the whole chain as of `now`.
    pub fn verify_chain_at(&self, now: DateTime<Utc>) -> Result<ChainReport, AuditError> {
        let blocks = self.log.blocks()?;
        Ok(verify_blocks(&blocks, now, self.grace))
    }

    /// Checks a single block: numbering, own hash, link to its predecessor.
    pub fn verify_block(&self, block_number: u64) -> Result<bool, AuditError> {
        if block_number == 0 {
            return Ok(false);
        }
        let blocks = self.log.blocks()?;
        let index = (block_number - 1) as usize;
        let Some(block) = blocks.get(index) else {
            return Ok(false);
        };
        let expected_previous = match index {
            0 => Some(audit_genesis_digest()),
            _ => blocks[index - 1].current_hash.clone(),
        };
        Ok(block.block_number == block_number
            && block.hash_matches()
            && Some(&block.previous_hash) == expected_previous.as_ref())
    }

    /// Fails with [`AuditError::ChainIntegrityViolation`] on the first bad block.
    pub fn ensure_intact(&self) -> Result<ChainReport, AuditError> {
        let report = self.verify_chain()?;
        report.ensure_intact()?;
        Ok(report)
    }

    /// Blocks for one entity, in chain order. Blocks without a reason are logged.
    pub fn get_trail(&self, entity_type: &EntityType, entity_id: &str) -> Result<Vec<AuditBlock>, AuditError> {
        let trail = self.log.trail(entity_type, entity_id)?;
        for block in trail.iter().filter(|b| b.payload.reason_missing()) {
            tracing::warn!(
                block_number = block.block_number,
                entity_id = %block.entity_id,
                "audit block has no reason"
            );
        }
        Ok(trail)
    }
}
