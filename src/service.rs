//! Record service: create, update, query and history over one record shape.

use crate::error::{LedgerError, Result};
use crate::ledger::{encode_history, CommitReceipt, HistoryEntry, HistoryLedger, Ledger, RecordStore};
use crate::record::RecordSchema;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Invocation name of create.
pub const CREATE_ASSET: &str = "createAsset";
/// Invocation name of update.
pub const UPDATE_ASSET: &str = "updateAsset";
/// Invocation name of query.
pub const QUERY_ASSET: &str = "queryAsset";
/// Invocation name of history.
pub const GET_ASSET_HISTORY: &str = "getAssetHistory";
/// Transaction label of delete. Not reachable through dispatch.
pub const DELETE_ASSET: &str = "deleteAsset";

/// Event emitted when a record is created.
pub const EVENT_CREATED: &str = "AssetCreated";
/// Event emitted when a record is written by update.
pub const EVENT_UPDATED: &str = "AssetUpdated";
/// Event emitted when a record is deleted.
pub const EVENT_DELETED: &str = "AssetDeleted";

/// Record operations for shape `R`.
///
/// Every write runs as a single ledger transaction, so the current value, its
/// history entry and the event either all commit or none do.
pub struct RecordService<R: RecordSchema> {
    ledger: Arc<Ledger>,
    _record: PhantomData<fn() -> R>,
}

impl<R: RecordSchema> Clone for RecordService<R> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.ledger))
    }
}

impl<R: RecordSchema> RecordService<R> {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            _record: PhantomData,
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Create a record from positional arguments.
    pub fn create(&self, args: &[String]) -> Result<CommitReceipt> {
        let record = R::from_args(args)?;
        self.create_record(&record)
    }

    /// Create `record`; fails with `DuplicateKey` if its id is live.
    pub fn create_record(&self, record: &R) -> Result<CommitReceipt> {
        record.validate()?;
        let bytes = record.to_bytes()?;
        let id = record.id();

        let (_, receipt) = self.ledger.submit(CREATE_ASSET, |ctx| {
            if ctx.exists(id)? {
                return Err(LedgerError::DuplicateKey(id.to_string()));
            }
            ctx.put(id, bytes)?;
            ctx.set_event(EVENT_CREATED, id.as_bytes().to_vec())
        })?;

        Ok(receipt)
    }

    /// Write a record from positional arguments, whether or not it exists.
    pub fn update(&self, args: &[String]) -> Result<CommitReceipt> {
        let record = R::from_args(args)?;
        self.update_record(&record)
    }

    /// Write `record` unconditionally. An unknown id is created.
    pub fn update_record(&self, record: &R) -> Result<CommitReceipt> {
        record.validate()?;
        let bytes = record.to_bytes()?;
        let id = record.id();

        let (_, receipt) = self.ledger.submit(UPDATE_ASSET, |ctx| {
            ctx.put(id, bytes)?;
            ctx.set_event(EVENT_UPDATED, id.as_bytes().to_vec())
        })?;

        Ok(receipt)
    }

    /// Stored bytes of `id`, verbatim.
    pub fn query(&self, id: &str) -> Result<Vec<u8>> {
        self.ledger.evaluate(QUERY_ASSET, |ctx| {
            ctx.get(id)?
                .ok_or_else(|| LedgerError::NotFound(id.to_string()))
        })
    }

    /// History of `id` as the JSON array served to callers. Empty array for
    /// ids that were never written.
    pub fn history(&self, id: &str) -> Result<Vec<u8>> {
        let entries = HistoryLedger::history(self.ledger.as_ref(), id)?;
        let encoded = encode_history(entries, self.ledger.config().timestamp_format)?;

        debug!(id, bytes = encoded.len(), "history encoded");
        Ok(encoded)
    }

    /// Decoded history of `id`, oldest first.
    pub fn history_entries(&self, id: &str) -> Result<Vec<HistoryEntry>> {
        self.ledger.history(id)?.collect()
    }

    /// Current record under `id`, decoded.
    pub fn get_record(&self, id: &str) -> Result<Option<R>> {
        match self.ledger.get(id)? {
            Some(bytes) => Ok(Some(R::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete `id`, leaving a tombstone in its history.
    pub fn delete(&self, id: &str) -> Result<CommitReceipt> {
        let (_, receipt) = self.ledger.submit(DELETE_ASSET, |ctx| {
            if !ctx.exists(id)? {
                return Err(LedgerError::NotFound(id.to_string()));
            }
            ctx.delete(id)?;
            ctx.set_event(EVENT_DELETED, id.as_bytes().to_vec())
        })?;

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::record::{AssetRecord, DealerProfile};
    use crate::types::Sequence;
    use tempfile::TempDir;

    fn test_service(dir: &TempDir) -> RecordService<DealerProfile> {
        let ledger = Ledger::create(LedgerConfig::at(dir.path().join("ledger"))).unwrap();
        RecordService::new(Arc::new(ledger))
    }

    fn profile(id: &str, remarks: &str) -> Vec<String> {
        [id, "9990001", "1234", "1000", "ACTIVE", "0", "NA", remarks]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_create_then_query() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir);

        let receipt = service.create(&profile("D1", "first")).unwrap();
        assert_eq!(receipt.entries.len(), 1);
        assert_eq!(receipt.event.as_ref().unwrap().name, EVENT_CREATED);
        assert_eq!(receipt.event.as_ref().unwrap().payload, b"D1");

        let bytes = service.query("D1").unwrap();
        let record = DealerProfile::from_bytes(&bytes).unwrap();
        assert_eq!(record.to_args(), profile("D1", "first"));
    }

    #[test]
    fn test_duplicate_create_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir);

        service.create(&profile("D1", "first")).unwrap();
        let head = service.ledger().head();

        let err = service.create(&profile("D1", "second")).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateKey(ref id) if id == "D1"));
        assert_eq!(err.to_string(), "This asset already exists: D1");

        assert_eq!(service.ledger().head(), head);
        assert_eq!(service.history_entries("D1").unwrap().len(), 1);
        assert_eq!(service.get_record("D1").unwrap().unwrap().remarks, "first");
    }

    #[test]
    fn test_update_creates_missing() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir);

        let receipt = service.update(&profile("D9", "upsert")).unwrap();
        assert_eq!(receipt.event.unwrap().name, EVENT_UPDATED);
        assert_eq!(service.get_record("D9").unwrap().unwrap().remarks, "upsert");
    }

    #[test]
    fn test_wrong_arity_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir);

        let err = service.create(&["D1".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "Incorrect number of arguments. Expecting 8");
        assert_eq!(service.ledger().head(), Sequence(0));
    }

    #[test]
    fn test_query_missing() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir);

        let err = service.query("nope").unwrap_err();
        assert_eq!(err.to_string(), "Asset not found");
        assert_eq!(service.history("nope").unwrap(), b"[]");
    }

    #[test]
    fn test_history_orders_writes() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir);

        service.create(&profile("D1", "r0")).unwrap();
        for i in 1..4 {
            service.update(&profile("D1", &format!("r{}", i))).unwrap();
        }

        let entries = service.history_entries("D1").unwrap();
        assert_eq!(entries.len(), 4);
        for pair in entries.windows(2) {
            assert!(pair[0].sequence < pair[1].sequence);
        }

        let json: serde_json::Value = serde_json::from_slice(&service.history("D1").unwrap()).unwrap();
        let array = json.as_array().unwrap();
        assert_eq!(array.len(), 4);
        for (i, item) in array.iter().enumerate() {
            assert_eq!(item["IsDelete"], "false");
            assert_eq!(item["Value"]["REMARKS"], format!("r{}", i));
            assert_eq!(item["TxId"].as_str().unwrap().len(), 64);
        }
    }

    #[test]
    fn test_delete_then_recreate() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir);

        service.create(&profile("D1", "first")).unwrap();
        let receipt = service.delete("D1").unwrap();
        assert_eq!(receipt.event.unwrap().name, EVENT_DELETED);
        assert!(matches!(service.query("D1"), Err(LedgerError::NotFound(_))));

        service.create(&profile("D1", "again")).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&service.history("D1").unwrap()).unwrap();
        let array = json.as_array().unwrap();
        assert_eq!(array.len(), 3);
        assert_eq!(array[1]["IsDelete"], "true");
        assert!(array[1]["Value"].is_null());
        assert_eq!(array[2]["Value"]["REMARKS"], "again");
    }

    #[test]
    fn test_delete_missing() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir);

        assert!(matches!(service.delete("D1"), Err(LedgerError::NotFound(_))));
        assert_eq!(service.ledger().head(), Sequence(0));
    }

    #[test]
    fn test_asset_variant() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::create(LedgerConfig::at(dir.path().join("ledger"))).unwrap();
        let service: RecordService<AssetRecord> = RecordService::new(Arc::new(ledger));

        service
            .create(&["A1".to_string(), "widget".to_string(), "7".to_string()])
            .unwrap();
        assert_eq!(service.query("A1").unwrap(), br#"{"id":"A1","name":"widget","value":7}"#);
    }
}
