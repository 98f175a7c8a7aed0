//! Event Store implementations for Furrow.
//!
//! This crate provides:
//! - [`MemoryStore`], a volatile store for tests and one-shot imports
//! - [`JournalStore`], a durable store replayed from a `furrow-journal` file
//! - Event filters for listings
//!
//! Both stores implement the `EventQuery`, `AuditLog` and `EventStore`
//! contracts from `furrow-core`, maintain an EPC containment index and an
//! incremental lineage index, and commit each event mutation together with
//! its audit block under a single lock.

#![deny(missing_docs)]

/// Error types for store operations.
pub mod error;
/// Event filtering.
pub mod filter;
/// Journal-backed store.
pub mod journal;
/// In-memory store.
pub mod memory;
mod state;

pub use error::StoreError;
pub use filter::{select, AndFilter, EpcFilter, EventFilter, EventTypeFilter, TimeRangeFilter};
pub use furrow_journal::WriteOptions;
pub use journal::JournalStore;
pub use memory::MemoryStore;
