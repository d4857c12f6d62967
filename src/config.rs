//! Ledger configuration.

use crate::error::{LedgerError, Result};
use crate::record::RecordVariant;
use crate::types::TimestampFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Ledger configuration.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Base directory for the ledger files.
    pub path: PathBuf,

    /// Whether to create the ledger if it doesn't exist.
    pub create_if_missing: bool,

    /// Fsync the transaction log every N commits (0 = every commit).
    pub sync_interval: u64,

    /// Number of current values kept decoded in memory.
    pub state_cache_size: usize,

    /// Default per-subscriber event buffer.
    pub event_buffer_size: usize,

    /// Record shape this deployment serves.
    pub variant: RecordVariant,

    /// Rendering of history timestamps.
    pub timestamp_format: TimestampFormat,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./ledger"),
            create_if_missing: true,
            sync_interval: 1,
            state_cache_size: 1000,
            event_buffer_size: 1000,
            variant: RecordVariant::default(),
            timestamp_format: TimestampFormat::default(),
        }
    }
}

impl LedgerConfig {
    /// Config rooted at `path`, everything else default.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            LedgerError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }
}
