//! Core types for the ledger.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Global commit sequence (one per committed transaction).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Sequence(pub u64);

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Sequence {
    pub fn next(self) -> Self {
        Sequence(self.0 + 1)
    }
}

/// Transaction identifier (SHA-256 digest, rendered as lowercase hex).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub [u8; 32]);

impl TxId {
    /// Derive the id of a transaction from its commit coordinates.
    ///
    /// The sequence is unique per ledger, so two transactions never share an id.
    pub fn derive(sequence: Sequence, timestamp: Timestamp, function: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(sequence.0.to_le_bytes());
        hasher.update(timestamp.seconds.to_le_bytes());
        hasher.update(timestamp.nanos.to_le_bytes());
        hasher.update(function.as_bytes());
        TxId(hasher.finalize().into())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Commit time: seconds since the Unix epoch plus sub-second nanos.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp {
            seconds: duration.as_secs() as i64,
            nanos: duration.subsec_nanos(),
        }
    }

    /// Render for history output.
    pub fn render(&self, format: TimestampFormat) -> String {
        let dt = DateTime::<Utc>::from_timestamp(self.seconds, self.nanos).unwrap_or_default();
        match format {
            TimestampFormat::Compat => {
                let mut out = dt.format("%Y-%m-%d %H:%M:%S").to_string();
                if self.nanos > 0 {
                    let fraction = format!("{:09}", self.nanos);
                    out.push('.');
                    out.push_str(fraction.trim_end_matches('0'));
                }
                out.push_str(" +0000 UTC");
                out
            }
            TimestampFormat::Rfc3339 => dt.to_rfc3339_opts(SecondsFormat::Nanos, true),
        }
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}.{:09})", self.seconds, self.nanos)
    }
}

/// How history timestamps are rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// `2024-03-01 12:00:00.5 +0000 UTC`: trailing fractional zeros trimmed,
    /// fraction omitted on whole seconds.
    #[default]
    Compat,
    /// RFC 3339 with nanoseconds, e.g. `2024-03-01T12:00:00.500000000Z`.
    Rfc3339,
}

/// Event attached to a transaction, published once the transaction commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub name: String,
    pub payload: Vec<u8>,
}
