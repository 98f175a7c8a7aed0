//! Appending commits.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::errors::JournalError;
use crate::frame::{FrameHeader, FrameKind, JournalHeader, HEADER_SIZE};
use crate::record::{CommitRef, Record};

/// Options for journal writing.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// fsync after each commit (default: false).
    pub sync: bool,
    /// Create the file if missing (default: true).
    pub create: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            sync: false,
            create: true,
        }
    }
}

/// Append-only writer. Each [`append_commit`](Self::append_commit) writes one frame.
///
/// A failed append truncates the file back to where it started, so a commit
/// is either fully present or absent.
pub struct JournalWriter {
    file: File,
    sync: bool,
    len: u64,
}

impl JournalWriter {
    /// Opens or creates a journal, writing the header into an empty file.
    pub fn open<P: AsRef<Path>>(path: P, options: WriteOptions) -> Result<Self, JournalError> {
        let mut file = OpenOptions::new()
            .create(options.create)
            .read(true)
            .write(true)
            .open(path)?;

        let len = file.metadata()?.len();
        let len = if len == 0 {
            file.write_all(&JournalHeader::default().to_bytes())?;
            file.flush()?;
            if options.sync {
                file.sync_all()?;
            }
            HEADER_SIZE as u64
        } else if len < HEADER_SIZE as u64 {
            return Err(JournalError::NotAJournal { len });
        } else {
            let mut header = [0u8; HEADER_SIZE];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header)?;
            JournalHeader::from_bytes(&header)?;
            len
        };
        file.seek(SeekFrom::Start(len))?;

        Ok(Self {
            file,
            sync: options.sync,
            len,
        })
    }

    /// Current file length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True when only the header has been written.
    pub fn is_empty(&self) -> bool {
        self.len == HEADER_SIZE as u64
    }

    /// Cuts the file back to `len` bytes, discarding a torn tail found on replay.
    pub fn truncate_to(&mut self, len: u64) -> Result<(), JournalError> {
        if len < HEADER_SIZE as u64 || len > self.len {
            return Err(JournalError::InvalidFrame {
                offset: len,
                reason: format!("cannot truncate a {}-byte journal to {}", self.len, len),
            });
        }
        self.file.set_len(len)?;
        self.file.seek(SeekFrom::Start(len))?;
        self.len = len;
        Ok(())
    }

    /// Writes `records` as one commit frame.
    pub fn append_commit(&mut self, records: &[Record]) -> Result<(), JournalError> {
        if records.is_empty() {
            return Err(JournalError::EmptyCommit);
        }
        let payload = serde_json::to_vec(&CommitRef { records })?;
        let header = FrameHeader::new(FrameKind::Commit, payload.len())?;

        let mut frame = Vec::with_capacity(header.to_bytes().len() + payload.len());
        frame.extend_from_slice(&header.to_bytes());
        frame.extend_from_slice(&payload);

        if let Err(err) = self.write_frame(&frame) {
            // Best effort: drop the partial frame so replay sees the prior state.
            let _ = self.file.set_len(self.len);
            let _ = self.file.seek(SeekFrom::Start(self.len));
            return Err(err);
        }
        self.len += frame.len() as u64;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), JournalError> {
        self.file.write_all(frame)?;
        self.file.flush()?;
        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Flushes and closes the file.
    pub fn finish(mut self) -> Result<(), JournalError> {
        self.file.flush()?;
        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for JournalWriter {
    fn drop(&mut self) {
        let _ = self.file.flush();
    }
}
