//! Error types for store operations.

use std::path::PathBuf;

use furrow_core::BackendError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Journal read or write failed.
    #[error("journal error: {0}")]
    Journal(#[from] furrow_journal::JournalError),
    /// Replayed commit does not fit the state built so far.
    #[error("commit {commit} is inconsistent: {reason}")]
    Inconsistent {
        /// Zero-based commit index in the journal.
        commit: usize,
        /// What did not fit.
        reason: String,
    },
    /// Mutation attempted on a store opened read-only.
    #[error("journal {} is open read-only", .0.display())]
    ReadOnly(PathBuf),
}

impl From<StoreError> for BackendError {
    fn from(err: StoreError) -> Self {
        BackendError::new(err)
    }
}
