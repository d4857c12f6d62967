//! Per-key mutation history.

use crate::error::{LedgerError, Result};
use crate::ledger::index::WritePosition;
use crate::ledger::log::LogReader;
use crate::types::{Sequence, Timestamp, TimestampFormat, TxId};
use std::vec;

/// One committed mutation of a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub tx_id: TxId,
    pub sequence: Sequence,
    /// Serialized record, or `None` for a tombstone.
    pub value: Option<Vec<u8>>,
    pub timestamp: Timestamp,
    pub is_delete: bool,
}

/// Lazy, oldest-first walk over one key's history.
///
/// Owns a dedicated read handle on the transaction log, released when the
/// iterator is dropped. Stops after the first error.
pub struct HistoryIter {
    key: String,
    reader: Option<LogReader>,
    positions: vec::IntoIter<WritePosition>,
}

impl HistoryIter {
    pub(crate) fn new(key: &str, reader: LogReader, positions: Vec<WritePosition>) -> Self {
        Self {
            key: key.to_string(),
            reader: Some(reader),
            positions: positions.into_iter(),
        }
    }

    /// Iterator for a key that was never written.
    pub(crate) fn empty(key: &str) -> Self {
        Self {
            key: key.to_string(),
            reader: None,
            positions: Vec::new().into_iter(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn read(&mut self, pos: WritePosition) -> Result<HistoryEntry> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| LedgerError::Corruption("history reader already released".into()))?;
        let (tx, _) = reader.read_at(pos.offset)?;

        let write = tx.writes.into_iter().nth(pos.slot as usize).ok_or_else(|| {
            LedgerError::Corruption(format!(
                "transaction {} has no write slot {}",
                tx.tx_id, pos.slot
            ))
        })?;
        if write.key != self.key {
            return Err(LedgerError::Corruption(format!(
                "index points {} at a write to {}",
                self.key, write.key
            )));
        }

        let is_delete = write.is_delete();
        Ok(HistoryEntry {
            tx_id: tx.tx_id,
            sequence: tx.sequence,
            value: write.value,
            timestamp: tx.timestamp,
            is_delete,
        })
    }
}

impl Iterator for HistoryIter {
    type Item = Result<HistoryEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.positions.next()?;
        match self.read(pos) {
            Ok(entry) => Some(Ok(entry)),
            Err(e) => {
                self.positions = Vec::new().into_iter();
                self.reader = None;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.positions.len()))
    }
}

/// Encode history as the JSON array served to callers:
///
/// ```text
/// [{"TxId":"..", "Value":{..}, "Timestamp":"..", "IsDelete":"false"},...]
/// ```
///
/// `Value` is the raw stored record, or `null` for a tombstone. `IsDelete` is
/// a string, not a JSON boolean.
pub fn encode_history<I>(entries: I, format: TimestampFormat) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = Result<HistoryEntry>>,
{
    let mut buffer = Vec::new();
    buffer.push(b'[');

    let mut first = true;
    for entry in entries {
        let entry = entry?;

        if !first {
            buffer.push(b',');
        }
        first = false;

        buffer.extend_from_slice(b"{\"TxId\":\"");
        buffer.extend_from_slice(entry.tx_id.to_hex().as_bytes());
        buffer.extend_from_slice(b"\", \"Value\":");
        match (&entry.value, entry.is_delete) {
            (Some(value), false) => buffer.extend_from_slice(value),
            _ => buffer.extend_from_slice(b"null"),
        }
        buffer.extend_from_slice(b", \"Timestamp\":\"");
        buffer.extend_from_slice(entry.timestamp.render(format).as_bytes());
        buffer.extend_from_slice(b"\", \"IsDelete\":\"");
        let flag: &[u8] = if entry.is_delete { b"true" } else { b"false" };
        buffer.extend_from_slice(flag);
        buffer.extend_from_slice(b"\"}");
    }

    buffer.push(b']');
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(sequence: u64, value: Option<&[u8]>) -> HistoryEntry {
        HistoryEntry {
            tx_id: TxId([sequence as u8; 32]),
            sequence: Sequence(sequence),
            value: value.map(|v| v.to_vec()),
            timestamp: Timestamp::new(1_700_000_000, 0),
            is_delete: value.is_none(),
        }
    }

    #[test]
    fn test_encode_empty() {
        let bytes = encode_history(Vec::new(), TimestampFormat::Compat).unwrap();
        assert_eq!(bytes, b"[]");
    }

    #[test]
    fn test_encode_exact_layout() {
        let entries = vec![Ok(entry(1, Some(br#"{"id":"A1"}"#))), Ok(entry(2, None))];
        let bytes = encode_history(entries, TimestampFormat::Compat).unwrap();

        let first = "01".repeat(32);
        let second = "02".repeat(32);
        let expected = format!(
            "[{{\"TxId\":\"{first}\", \"Value\":{{\"id\":\"A1\"}}, \"Timestamp\":\"2023-11-14 22:13:20 +0000 UTC\", \"IsDelete\":\"false\"}},\
             {{\"TxId\":\"{second}\", \"Value\":null, \"Timestamp\":\"2023-11-14 22:13:20 +0000 UTC\", \"IsDelete\":\"true\"}}]"
        );
        assert_eq!(String::from_utf8(bytes).unwrap(), expected);
    }

    #[test]
    fn test_encoded_history_is_valid_json() {
        let entries = vec![Ok(entry(1, Some(br#"{"id":"A1","value":3}"#)))];
        let bytes = encode_history(entries, TimestampFormat::Rfc3339).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed[0]["Value"]["value"], 3);
        assert_eq!(parsed[0]["IsDelete"], "false");
        assert_eq!(parsed[0]["Timestamp"], "2023-11-14T22:13:20.000000000Z");
    }

    #[test]
    fn test_encode_propagates_errors() {
        let entries = vec![
            Ok(entry(1, Some(b"{}"))),
            Err(LedgerError::Corruption("bad frame".into())),
        ];
        assert!(encode_history(entries, TimestampFormat::Compat).is_err());
    }

    #[test]
    fn test_empty_iterator() {
        let mut iter = HistoryIter::empty("never");
        assert_eq!(iter.key(), "never");
        assert!(iter.next().is_none());
    }
}
