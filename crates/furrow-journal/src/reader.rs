//! Reading commits back.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::errors::JournalError;
use crate::frame::{FrameHeader, FrameKind, JournalHeader, FRAME_HEADER_SIZE, HEADER_SIZE};
use crate::record::{Commit, Record};

/// How a file that ends inside a frame is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// A truncated frame is an error.
    Strict,
    /// A truncated trailing frame is treated as end-of-file.
    Permissive,
}

/// Sequential commit reader.
///
/// ```rust,no_run
/// use furrow_journal::{JournalReader, ReadMode};
///
/// let mut reader = JournalReader::open("furrow.frj", ReadMode::Strict)?;
/// while let Some(records) = reader.read_commit()? {
///     println!("{} records", records.len());
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct JournalReader {
    input: BufReader<File>,
    mode: ReadMode,
    position: u64,
    truncated: bool,
}

impl JournalReader {
    /// Opens a journal and checks its header.
    pub fn open<P: AsRef<Path>>(path: P, mode: ReadMode) -> Result<Self, JournalError> {
        let mut input = BufReader::new(File::open(path)?);
        let mut header = [0u8; HEADER_SIZE];
        input.read_exact(&mut header).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                JournalError::InvalidHeader("file shorter than header".to_string())
            }
            _ => JournalError::Io(e),
        })?;
        JournalHeader::from_bytes(&header)?;

        Ok(Self {
            input,
            mode,
            position: HEADER_SIZE as u64,
            truncated: false,
        })
    }

    /// Offset just past the last complete frame read.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// True when a permissive read stopped at a torn trailing frame.
    pub fn hit_truncation(&self) -> bool {
        self.truncated
    }

    /// Next raw frame, or `None` at end-of-file.
    pub fn read_frame(&mut self) -> Result<Option<(FrameKind, Vec<u8>)>, JournalError> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        match fill(&mut self.input, &mut header)? {
            0 => return Ok(None),
            n if n < FRAME_HEADER_SIZE => return self.torn(),
            _ => {}
        }
        let frame = FrameHeader::from_bytes(&header, self.position)?;

        let mut payload = vec![0u8; frame.len as usize];
        if fill(&mut self.input, &mut payload)? < payload.len() {
            return self.torn();
        }

        self.position += (FRAME_HEADER_SIZE + payload.len()) as u64;
        Ok(Some((frame.kind, payload)))
    }

    /// Next commit's records, skipping frames of unknown kind.
    pub fn read_commit(&mut self) -> Result<Option<Vec<Record>>, JournalError> {
        loop {
            match self.read_frame()? {
                None => return Ok(None),
                Some((FrameKind::Commit, payload)) => {
                    let text = std::str::from_utf8(&payload)?;
                    let commit: Commit = serde_json::from_str(text)?;
                    return Ok(Some(commit.records));
                }
                Some((FrameKind::Unknown(_), _)) => continue,
            }
        }
    }

    /// Every remaining commit.
    pub fn read_all(&mut self) -> Result<Vec<Vec<Record>>, JournalError> {
        let mut commits = Vec::new();
        while let Some(records) = self.read_commit()? {
            commits.push(records);
        }
        Ok(commits)
    }

    fn torn<T>(&mut self) -> Result<Option<T>, JournalError> {
        match self.mode {
            ReadMode::Permissive => {
                self.truncated = true;
                Ok(None)
            }
            ReadMode::Strict => Err(JournalError::TruncatedFrame {
                offset: self.position,
            }),
        }
    }
}

/// Reads until `buf` is full or the input ends; returns bytes read.
fn fill(input: &mut impl Read, buf: &mut [u8]) -> Result<usize, JournalError> {
    let mut read = 0;
    while read < buf.len() {
        match input.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(read)
}
