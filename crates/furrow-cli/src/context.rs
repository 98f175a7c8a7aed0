//! Settings shared by every command.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use chrono::Duration;
use furrow_core::{ConversionTable, MassBalanceValidator};
use furrow_store::JournalStore;

pub struct Context {
    journal: PathBuf,
    factors: Option<PathBuf>,
    grace_secs: i64,
}

impl Context {
    pub fn new(journal: PathBuf, factors: Option<PathBuf>, grace_secs: i64) -> Self {
        Self {
            journal,
            factors,
            grace_secs,
        }
    }

    /// Opens the journal for recording, creating it if missing.
    pub fn open_store(&self) -> Result<JournalStore, Box<dyn std::error::Error>> {
        JournalStore::open(&self.journal)
            .map_err(|e| format!("Failed to open journal {}: {}", self.journal.display(), e).into())
    }

    /// Opens an existing journal for queries; the file is never written.
    pub fn open_store_read_only(&self) -> Result<JournalStore, Box<dyn std::error::Error>> {
        JournalStore::open_read_only(&self.journal)
            .map_err(|e| format!("Failed to read journal {}: {}", self.journal.display(), e).into())
    }

    pub fn validator(&self) -> Result<MassBalanceValidator, Box<dyn std::error::Error>> {
        let table = match &self.factors {
            None => ConversionTable::standard(),
            Some(path) => {
                let text = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read factors {}: {}", path.display(), e))?;
                let table = ConversionTable::from_json(&text)?;
                tracing::debug!(path = %path.display(), factors = table.len(), "conversion table loaded");
                table
            }
        };
        Ok(MassBalanceValidator::new(table))
    }

    pub fn grace(&self) -> Duration {
        Duration::seconds(self.grace_secs)
    }
}

/// Reads a file, or stdin when `input` is "-".
pub fn read_input(input: &str) -> Result<String, Box<dyn std::error::Error>> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        fs::read_to_string(input).map_err(|e| format!("Failed to read {}: {}", input, e).into())
    }
}
