//! The ledger: transaction log, key index, current-value cache and event hub.
//!
//! All mutation goes through [`Ledger::submit`], which runs an operation
//! against a fresh [`TxContext`] and, if the operation succeeds, frames every
//! staged write plus the event into one log entry. The index, the cache and
//! subscribers are updated only after that entry is written, so a key never
//! changes without a matching history entry.

mod context;
mod history;
mod index;
pub(crate) mod log;

pub use context::{HistoryLedger, RecordStore, TxContext};
pub use history::{encode_history, HistoryEntry, HistoryIter};
pub use index::{KeyIndex, WritePosition};
pub use log::{CommittedTx, KvWrite, LogReader, TxIterator, TxLog};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::events::{EventFilter, EventHub, SubscriptionConfig, SubscriptionHandle};
use crate::types::{ContractEvent, Sequence, Timestamp, TxId};
use fs2::FileExt;
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Magic bytes for the ledger manifest.
const LEDGER_MAGIC: &[u8; 4] = b"ALG\0";

/// Current ledger format version.
const LEDGER_VERSION: u8 = 1;

const MANIFEST_FILE: &str = "MANIFEST";
const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "tx.log";
const INDEX_FILE: &str = "keys.idx";

/// Outcome of a committed transaction.
#[derive(Clone, Debug)]
pub struct CommitReceipt {
    pub tx_id: TxId,
    pub sequence: Sequence,
    pub timestamp: Timestamp,
    /// History entries appended by this commit, keyed by record id.
    pub entries: Vec<(String, HistoryEntry)>,
    pub event: Option<ContractEvent>,
}

impl CommitReceipt {
    fn from_tx(tx: CommittedTx) -> Self {
        let entries = tx
            .writes
            .into_iter()
            .map(|write| {
                let is_delete = write.is_delete();
                let entry = HistoryEntry {
                    tx_id: tx.tx_id,
                    sequence: tx.sequence,
                    value: write.value,
                    timestamp: tx.timestamp,
                    is_delete,
                };
                (write.key, entry)
            })
            .collect();

        Self {
            tx_id: tx.tx_id,
            sequence: tx.sequence,
            timestamp: tx.timestamp,
            entries,
            event: tx.event,
        }
    }
}

/// Ledger statistics.
#[derive(Clone, Debug, Default)]
pub struct LedgerStats {
    pub head: Sequence,
    pub live_records: u64,
    pub keys_ever_written: u64,
    pub log_size_bytes: u64,
    pub subscribers: u64,
}

/// The ledger.
pub struct Ledger {
    /// Ledger configuration.
    config: LedgerConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Committed transactions.
    log: TxLog,

    /// Key -> write positions.
    index: KeyIndex,

    /// Recently read or written current values.
    cache: Mutex<LruCache<String, Option<Vec<u8>>>>,

    /// Subscribers to committed events.
    events: EventHub,

    /// Serializes commits.
    write_lock: Mutex<()>,
}

impl Ledger {
    /// Open an existing ledger or create a new one.
    pub fn open_or_create(config: LedgerConfig) -> Result<Self> {
        if config.path.join(MANIFEST_FILE).exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(LedgerError::NotInitialized)
        }
    }

    /// Create a new ledger.
    pub fn create(config: LedgerConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;

        let lock_file = Self::acquire_lock(&config.path)?;
        let log = TxLog::open(config.path.join(LOG_FILE), config.sync_interval)?;
        let index = KeyIndex::new(config.path.join(INDEX_FILE));
        index.set_watermark(log.size());

        info!(path = %config.path.display(), variant = ?config.variant, "ledger created");

        Ok(Self::assemble(config, lock_file, log, index))
    }

    /// Open an existing ledger.
    pub fn open(config: LedgerConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;

        let lock_file = Self::acquire_lock(&config.path)?;
        let log = TxLog::open(config.path.join(LOG_FILE), config.sync_interval)?;
        let index = Self::load_index(&config.path, &log)?;

        info!(
            path = %config.path.display(),
            head = index.head().0,
            keys = index.key_count(),
            "ledger opened"
        );

        Ok(Self::assemble(config, lock_file, log, index))
    }

    fn assemble(config: LedgerConfig, lock_file: File, log: TxLog, index: KeyIndex) -> Self {
        let cache_size = NonZeroUsize::new(config.state_cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            config,
            _lock_file: lock_file,
            log,
            index,
            cache: Mutex::new(LruCache::new(cache_size)),
            events: EventHub::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Load the saved index and replay the log past its watermark. Falls back
    /// to a full rebuild when the saved index is unusable.
    fn load_index(path: &Path, log: &TxLog) -> Result<KeyIndex> {
        let index_path = path.join(INDEX_FILE);

        let index = match KeyIndex::load(&index_path) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "saved index unreadable; rebuilding from log");
                KeyIndex::new(&index_path)
            }
        };

        if index.watermark() > log.size() {
            warn!(
                watermark = index.watermark(),
                log_size = log.size(),
                "saved index is ahead of the log; rebuilding"
            );
            index.clear();
        }

        if let Err(e) = Self::replay(&index, log) {
            warn!(error = %e, "index catch-up failed; rebuilding from log");
            index.clear();
            Self::replay(&index, log)?;
        }

        Ok(index)
    }

    fn replay(index: &KeyIndex, log: &TxLog) -> Result<()> {
        let mut replayed = 0usize;
        for result in log.iter_from(index.watermark())? {
            let (offset, tx) = result?;
            index.add_tx(offset, &tx);
            replayed += 1;
        }
        index.set_watermark(log.size());

        if replayed > 0 {
            info!(replayed, "replayed transactions into index");
        }
        Ok(())
    }

    // --- Transactions ---

    /// Run `op` as one transaction and commit what it staged.
    ///
    /// If `op` fails, nothing it staged is written and no event is published.
    pub fn submit<T, F>(&self, function: &str, op: F) -> Result<(T, CommitReceipt)>
    where
        F: FnOnce(&mut TxContext<'_>) -> Result<T>,
    {
        let _lock = self.write_lock.lock();

        let mut ctx = TxContext::new(self, function, self.index.head().next());
        let output = match op(&mut ctx) {
            Ok(output) => output,
            Err(e) => {
                debug!(function, tx_id = %ctx.tx_id(), error = %e, "transaction aborted");
                return Err(e);
            }
        };

        let receipt = self.commit(ctx)?;
        Ok((output, receipt))
    }

    /// Run `op` read-only. Anything it stages is discarded.
    pub fn evaluate<T, F>(&self, function: &str, op: F) -> Result<T>
    where
        F: FnOnce(&mut TxContext<'_>) -> Result<T>,
    {
        let mut ctx = TxContext::new(self, function, self.index.head().next());
        let output = op(&mut ctx)?;

        if !ctx.writes().is_empty() {
            debug!(function, discarded = ctx.writes().len(), "evaluate discarded staged writes");
        }
        Ok(output)
    }

    fn commit(&self, ctx: TxContext<'_>) -> Result<CommitReceipt> {
        let tx = ctx.into_committed();
        let offset = self.log.append(&tx)?;

        {
            let mut cache = self.cache.lock();
            self.index.add_tx(offset, &tx);
            self.index.set_watermark(self.log.size());
            for write in &tx.writes {
                cache.put(write.key.clone(), write.value.clone());
            }
        }

        debug!(
            tx_id = %tx.tx_id,
            sequence = tx.sequence.0,
            function = %tx.function,
            writes = tx.writes.len(),
            "transaction committed"
        );

        self.events.publish(&tx);
        Ok(CommitReceipt::from_tx(tx))
    }

    // --- Reads ---

    /// Current committed value of `key`.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(cached) = self.cache.lock().get(key) {
            return Ok(cached.clone());
        }

        let pos = match self.index.latest(key) {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let value = if pos.is_delete {
            None
        } else {
            self.read_value(key, pos)?
        };

        // Only cache if no commit touched the key in the meantime.
        let mut cache = self.cache.lock();
        if self.index.latest(key) == Some(pos) {
            cache.put(key.to_string(), value.clone());
        }

        Ok(value)
    }

    fn read_value(&self, key: &str, pos: WritePosition) -> Result<Option<Vec<u8>>> {
        let tx = self.log.read_at(pos.offset)?;
        let write = tx
            .writes
            .into_iter()
            .nth(pos.slot as usize)
            .filter(|w| w.key == key)
            .ok_or_else(|| {
                LedgerError::Corruption(format!(
                    "index entry for {} does not match the log at offset {}",
                    key, pos.offset
                ))
            })?;
        Ok(write.value)
    }

    /// Committed history of `key`, oldest first.
    pub fn history(&self, key: &str) -> Result<HistoryIter> {
        let positions = self.index.positions(key);
        if positions.is_empty() {
            return Ok(HistoryIter::empty(key));
        }

        debug!(key, entries = positions.len(), "reading history");
        Ok(HistoryIter::new(key, self.log.reader()?, positions))
    }

    // --- Events ---

    /// Subscribe with the configured buffer size.
    pub fn subscribe(&self, filter: EventFilter) -> SubscriptionHandle {
        self.events.subscribe(SubscriptionConfig {
            buffer_size: self.config.event_buffer_size,
            filter,
        })
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    // --- Ledger ---

    /// Last committed sequence.
    pub fn head(&self) -> Sequence {
        self.index.head()
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            head: self.index.head(),
            live_records: self.index.live_count() as u64,
            keys_ever_written: self.index.key_count() as u64,
            log_size_bytes: self.log.size(),
            subscribers: self.events.subscription_count() as u64,
        }
    }

    /// Flush the log and save the index.
    pub fn sync(&self) -> Result<()> {
        let _lock = self.write_lock.lock();
        self.log.sync()?;
        self.index.save()?;
        Ok(())
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // --- Private Helpers ---

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join(MANIFEST_FILE))?;

        file.write_all(LEDGER_MAGIC)?;
        file.write_all(&[LEDGER_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let mut file = match File::open(path.join(MANIFEST_FILE)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LedgerError::NotInitialized)
            }
            Err(e) => return Err(e.into()),
        };

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != LEDGER_MAGIC {
            return Err(LedgerError::InvalidFormat("Invalid ledger magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != LEDGER_VERSION {
            return Err(LedgerError::InvalidFormat(format!(
                "Unsupported ledger version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join(LOCK_FILE))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| LedgerError::Locked)?;

        Ok(lock_file)
    }
}

impl HistoryLedger for Ledger {
    fn history(&self, id: &str) -> Result<HistoryIter> {
        Ledger::history(self, id)
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
