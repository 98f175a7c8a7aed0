use thiserror::Error;

/// Errors that can occur during journal operations.
#[derive(Error, Debug)]
pub enum JournalError {
    /// I/O error during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Bad magic, version, flags or reserved bytes.
    #[error("invalid journal header: {0}")]
    InvalidHeader(String),
    /// Bad frame kind, reserved bytes or length.
    #[error("invalid frame at offset {offset}: {reason}")]
    InvalidFrame {
        /// Byte offset where the frame starts.
        offset: u64,
        /// What was wrong.
        reason: String,
    },
    /// Commit payload larger than a frame can hold.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Actual payload size.
        size: usize,
        /// Maximum allowed size.
        max: u32,
    },
    /// Commit payload is not UTF-8.
    #[error("invalid UTF-8 in commit payload: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    /// Commit payload is not a valid commit document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// A commit must carry at least one record.
    #[error("empty commit")]
    EmptyCommit,
    /// Non-empty file too short to hold a header.
    #[error("file is not a journal: {len} bytes, shorter than the header")]
    NotAJournal {
        /// File length.
        len: u64,
    },
    /// File ends inside a frame (strict mode).
    #[error("truncated frame at offset {offset}")]
    TruncatedFrame {
        /// Byte offset of the incomplete frame.
        offset: u64,
    },
}
