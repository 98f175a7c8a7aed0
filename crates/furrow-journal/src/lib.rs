//! Append-only commit journal for Furrow.
//!
//! Every mutation of the store is written as one frame holding a commit: the
//! event or annotation together with the audit block that records it. A
//! commit is therefore either entirely on disk or not at all, and replaying
//! the frames in order rebuilds the store.
//!
//! ```rust,no_run
//! use furrow_journal::{JournalReader, JournalWriter, ReadMode, WriteOptions};
//!
//! let writer = JournalWriter::open("furrow.frj", WriteOptions::default())?;
//! writer.finish()?;
//!
//! let mut reader = JournalReader::open("furrow.frj", ReadMode::Permissive)?;
//! let commits = reader.read_all()?;
//! println!("{} commits", commits.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(missing_docs)]

/// Error types for journal operations.
pub mod errors;
/// File and frame layout.
pub mod frame;
/// Reader.
pub mod reader;
/// Commit records.
pub mod record;
/// Writer.
pub mod writer;

pub use errors::JournalError;
pub use frame::{FrameHeader, FrameKind, JournalHeader, MAGIC, MAX_PAYLOAD_SIZE};
pub use reader::{JournalReader, ReadMode};
pub use record::{Commit, Record};
pub use writer::{JournalWriter, WriteOptions};
