//! Transaction context.
//!
//! Every operation runs against a [`TxContext`]. Reads go to committed state
//! (overlaid with the transaction's own staged writes); writes and the event
//! are staged and only reach the log when the ledger commits the transaction.

use crate::error::{LedgerError, Result};
use crate::ledger::history::HistoryIter;
use crate::ledger::log::{CommittedTx, KvWrite};
use crate::ledger::Ledger;
use crate::types::{ContractEvent, Sequence, Timestamp, TimestampFormat, TxId};

/// Current-value store keyed by record id.
pub trait RecordStore {
    /// Current value, or `None` if the key is absent or deleted.
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>>;

    /// Unconditional overwrite.
    fn put(&mut self, id: &str, value: Vec<u8>) -> Result<()>;

    /// Replace the current value with a tombstone.
    fn delete(&mut self, id: &str) -> Result<()>;

    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }
}

/// Read access to per-key history.
pub trait HistoryLedger {
    /// Committed history of `id`, oldest first. Empty for unknown keys.
    fn history(&self, id: &str) -> Result<HistoryIter>;
}

/// Staging area for one transaction.
pub struct TxContext<'a> {
    ledger: &'a Ledger,
    tx_id: TxId,
    sequence: Sequence,
    timestamp: Timestamp,
    function: String,
    writes: Vec<KvWrite>,
    event: Option<ContractEvent>,
}

impl<'a> TxContext<'a> {
    pub(crate) fn new(ledger: &'a Ledger, function: &str, sequence: Sequence) -> Self {
        let timestamp = Timestamp::now();
        Self {
            ledger,
            tx_id: TxId::derive(sequence, timestamp, function),
            sequence,
            timestamp,
            function: function.to_string(),
            writes: Vec::new(),
            event: None,
        }
    }

    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    /// Sequence this transaction commits at.
    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    /// Writes staged so far, in staging order.
    pub fn writes(&self) -> &[KvWrite] {
        &self.writes
    }

    /// Configured rendering for history timestamps.
    pub fn timestamp_format(&self) -> TimestampFormat {
        self.ledger.config().timestamp_format
    }

    /// Alias of [`RecordStore::get`].
    pub fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>> {
        RecordStore::get(self, key)
    }

    /// Alias of [`RecordStore::put`].
    pub fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        RecordStore::put(self, key, value)
    }

    /// Alias of [`RecordStore::delete`].
    pub fn del_state(&mut self, key: &str) -> Result<()> {
        RecordStore::delete(self, key)
    }

    /// Attach an event, published after commit. A later call replaces an
    /// earlier one.
    pub fn set_event(&mut self, name: &str, payload: Vec<u8>) -> Result<()> {
        if name.is_empty() {
            return Err(LedgerError::InvalidArgument(
                "Event name can not be empty".into(),
            ));
        }
        self.event = Some(ContractEvent {
            name: name.to_string(),
            payload,
        });
        Ok(())
    }

    /// Stage a write; a second write to the same key replaces the first.
    fn stage(&mut self, write: KvWrite) -> Result<()> {
        if write.key.is_empty() {
            return Err(LedgerError::InvalidArgument(
                "Empty key is not allowed".into(),
            ));
        }

        match self.writes.iter_mut().find(|w| w.key == write.key) {
            Some(existing) => *existing = write,
            None => self.writes.push(write),
        }
        Ok(())
    }

    pub(crate) fn into_committed(self) -> CommittedTx {
        CommittedTx {
            tx_id: self.tx_id,
            sequence: self.sequence,
            timestamp: self.timestamp,
            function: self.function,
            writes: self.writes,
            event: self.event,
        }
    }
}

impl RecordStore for TxContext<'_> {
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>> {
        if let Some(staged) = self.writes.iter().find(|w| w.key == id) {
            return Ok(staged.value.clone());
        }
        self.ledger.get(id)
    }

    fn put(&mut self, id: &str, value: Vec<u8>) -> Result<()> {
        self.stage(KvWrite::put(id, value))
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        self.stage(KvWrite::delete(id))
    }
}

impl HistoryLedger for TxContext<'_> {
    fn history(&self, id: &str) -> Result<HistoryIter> {
        self.ledger.history(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use tempfile::TempDir;

    fn test_ledger(dir: &TempDir) -> Ledger {
        Ledger::create(LedgerConfig::at(dir.path().join("ledger"))).unwrap()
    }

    #[test]
    fn test_state_primitives_stage_and_commit() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir);

        ledger
            .submit("seed", |ctx| ctx.put_state("K1", b"one".to_vec()))
            .unwrap();

        let (seen, _) = ledger
            .submit("rewrite", |ctx| {
                assert_eq!(ctx.get_state("K1")?, Some(b"one".to_vec()));
                ctx.put_state("K2", b"two".to_vec())?;
                ctx.del_state("K1")?;
                Ok((ctx.get_state("K1")?, ctx.get_state("K2")?))
            })
            .unwrap();
        assert_eq!(seen, (None, Some(b"two".to_vec())));

        assert_eq!(ledger.get("K1").unwrap(), None);
        assert_eq!(ledger.get("K2").unwrap(), Some(b"two".to_vec()));

        let history: Vec<_> = ledger.history("K1").unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[1].is_delete);
        assert_eq!(history[1].value, None);
    }

    #[test]
    fn test_state_primitives_reject_empty_key() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir);

        let result = ledger.submit("bad", |ctx| ctx.put_state("", b"x".to_vec()));
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
        assert_eq!(ledger.head(), Sequence(0));
    }
}
