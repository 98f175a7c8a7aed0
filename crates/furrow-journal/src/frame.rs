//! On-disk layout.
//!
//! ```text
//! header  (16 bytes): magic "FRJ1" | version u16 LE | flags u16 LE | 8 reserved zero bytes
//! frame   ( 8 bytes): kind u8 | 3 reserved zero bytes | payload length u32 LE
//! payload (len bytes): UTF-8 JSON commit document
//! ```

use crate::errors::JournalError;

/// Journal file magic bytes.
pub const MAGIC: &[u8; 4] = b"FRJ1";

/// Current format version.
pub const VERSION: u16 = 0x0001;

/// File header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// Frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest payload a single frame may carry: 16 MiB.
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

const FRAME_KIND_COMMIT: u8 = 0x01;

/// Journal file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalHeader {
    /// Format version.
    pub version: u16,
}

impl Default for JournalHeader {
    fn default() -> Self {
        Self { version: VERSION }
    }
}

impl JournalHeader {
    /// Encodes the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(MAGIC);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes
    }

    /// Decodes and checks a header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, JournalError> {
        if bytes.len() < HEADER_SIZE {
            return Err(JournalError::InvalidHeader(format!(
                "header too short: {} bytes",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(JournalError::InvalidHeader(format!(
                "invalid magic {:?}",
                &bytes[0..4]
            )));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(JournalError::InvalidHeader(format!(
                "unsupported version 0x{:04x}",
                version
            )));
        }
        if bytes[6..HEADER_SIZE].iter().any(|b| *b != 0) {
            return Err(JournalError::InvalidHeader(
                "non-zero flags or reserved bytes".to_string(),
            ));
        }
        Ok(Self { version })
    }
}

/// What a frame's payload holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// One atomic commit of records.
    Commit,
    /// Written by a newer version; skipped on read.
    Unknown(u8),
}

impl From<u8> for FrameKind {
    fn from(byte: u8) -> Self {
        match byte {
            FRAME_KIND_COMMIT => FrameKind::Commit,
            other => FrameKind::Unknown(other),
        }
    }
}

impl From<FrameKind> for u8 {
    fn from(kind: FrameKind) -> Self {
        match kind {
            FrameKind::Commit => FRAME_KIND_COMMIT,
            FrameKind::Unknown(byte) => byte,
        }
    }
}

/// Frame header preceding each payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload kind.
    pub kind: FrameKind,
    /// Payload length in bytes.
    pub len: u32,
}

impl FrameHeader {
    /// Header for a payload of `len` bytes.
    pub fn new(kind: FrameKind, len: usize) -> Result<Self, JournalError> {
        match u32::try_from(len) {
            Ok(len) if len <= MAX_PAYLOAD_SIZE => Ok(Self { kind, len }),
            _ => Err(JournalError::PayloadTooLarge {
                size: len,
                max: MAX_PAYLOAD_SIZE,
            }),
        }
    }

    /// Encodes the frame header.
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut bytes = [0u8; FRAME_HEADER_SIZE];
        bytes[0] = self.kind.into();
        bytes[4..8].copy_from_slice(&self.len.to_le_bytes());
        bytes
    }

    /// Decodes a frame header found at `offset`.
    pub fn from_bytes(bytes: &[u8; FRAME_HEADER_SIZE], offset: u64) -> Result<Self, JournalError> {
        let invalid = |reason: String| JournalError::InvalidFrame { offset, reason };
        if bytes[1..4] != [0u8; 3] {
            return Err(invalid("non-zero reserved bytes".to_string()));
        }
        let len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if len > MAX_PAYLOAD_SIZE {
            return Err(invalid(format!(
                "payload size {} exceeds maximum {}",
                len, MAX_PAYLOAD_SIZE
            )));
        }
        Ok(Self {
            kind: FrameKind::from(bytes[0]),
            len,
        })
    }
}
