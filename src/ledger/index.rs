//! Key index over the transaction log.
//!
//! For every key the index keeps the position of each write in commit order.
//! The last position is the key's current value (unless it is a tombstone).
//! The index is rebuilt from the log on open; a saved copy carries a
//! watermark (the log offset it covers) so only newer frames are replayed.

use crate::error::{LedgerError, Result};
use crate::ledger::log::CommittedTx;
use crate::types::Sequence;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for index files.
const INDEX_MAGIC: &[u8; 4] = b"KIX\0";

/// Current index format version.
const INDEX_VERSION: u8 = 1;

/// Cap on capacity reserved from counts read off disk.
const PREALLOC_LIMIT: usize = 4096;

/// Location of one key write in the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WritePosition {
    /// Offset of the transaction frame.
    pub offset: u64,
    /// Index of the write inside the transaction.
    pub slot: u32,
    /// Commit sequence of the transaction.
    pub sequence: Sequence,
    pub is_delete: bool,
}

/// Index mapping keys to their write positions.
pub struct KeyIndex {
    /// Path to the index file.
    path: PathBuf,

    /// Key -> every write, oldest first.
    history: RwLock<HashMap<String, Vec<WritePosition>>>,

    /// Last committed sequence.
    head: RwLock<Sequence>,

    /// Log offset up to which transactions are indexed.
    watermark: RwLock<u64>,
}

impl KeyIndex {
    /// Create an empty index.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            history: RwLock::new(HashMap::new()),
            head: RwLock::new(Sequence(0)),
            watermark: RwLock::new(0),
        }
    }

    /// Load index from file, or an empty index if there is none.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut index = Self::new(path);
        if index.path.exists() {
            index.load_from_file()?;
        }
        Ok(index)
    }

    /// Record a committed transaction framed at `offset`.
    pub fn add_tx(&self, offset: u64, tx: &CommittedTx) {
        let mut history = self.history.write();
        for (slot, write) in tx.writes.iter().enumerate() {
            history
                .entry(write.key.clone())
                .or_default()
                .push(WritePosition {
                    offset,
                    slot: slot as u32,
                    sequence: tx.sequence,
                    is_delete: write.is_delete(),
                });
        }
        drop(history);

        let mut head = self.head.write();
        if tx.sequence > *head {
            *head = tx.sequence;
        }
    }

    /// Mark the log as indexed up to `offset`.
    pub fn set_watermark(&self, offset: u64) {
        *self.watermark.write() = offset;
    }

    /// Position of the latest write to `key`.
    pub fn latest(&self, key: &str) -> Option<WritePosition> {
        self.history
            .read()
            .get(key)
            .and_then(|positions| positions.last().copied())
    }

    /// Every write to `key`, oldest first.
    pub fn positions(&self, key: &str) -> Vec<WritePosition> {
        self.history.read().get(key).cloned().unwrap_or_default()
    }

    /// Last committed sequence.
    pub fn head(&self) -> Sequence {
        *self.head.read()
    }

    /// Log offset covered by this index.
    pub fn watermark(&self) -> u64 {
        *self.watermark.read()
    }

    /// Number of keys whose latest write is not a tombstone.
    pub fn live_count(&self) -> usize {
        self.history
            .read()
            .values()
            .filter(|positions| positions.last().map_or(false, |p| !p.is_delete))
            .count()
    }

    /// Number of keys ever written.
    pub fn key_count(&self) -> usize {
        self.history.read().len()
    }

    /// Drop everything (before a full rebuild).
    pub fn clear(&self) {
        self.history.write().clear();
        *self.head.write() = Sequence(0);
        *self.watermark.write() = 0;
    }

    /// Save index to file.
    pub fn save(&self) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        let mut out = BufWriter::new(file);

        out.write_all(INDEX_MAGIC)?;
        out.write_all(&[INDEX_VERSION])?;
        out.write_all(&self.watermark().to_le_bytes())?;
        out.write_all(&self.head().0.to_le_bytes())?;

        let history = self.history.read();
        out.write_all(&(history.len() as u64).to_le_bytes())?;

        for (key, positions) in history.iter() {
            let key_bytes = key.as_bytes();
            out.write_all(&(key_bytes.len() as u32).to_le_bytes())?;
            out.write_all(key_bytes)?;
            out.write_all(&(positions.len() as u64).to_le_bytes())?;
            for pos in positions {
                out.write_all(&pos.offset.to_le_bytes())?;
                out.write_all(&pos.slot.to_le_bytes())?;
                out.write_all(&pos.sequence.0.to_le_bytes())?;
                out.write_all(&[pos.is_delete as u8])?;
            }
        }

        out.flush()?;
        out.get_ref().sync_all()?;
        Ok(())
    }

    /// Load index from file.
    fn load_from_file(&mut self) -> Result<()> {
        let mut file = BufReader::new(File::open(&self.path)?);

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != INDEX_MAGIC {
            return Err(LedgerError::InvalidFormat("Invalid index magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != INDEX_VERSION {
            return Err(LedgerError::InvalidFormat(format!(
                "Unsupported index version: {}",
                version[0]
            )));
        }

        let watermark = read_u64(&mut file)?;
        let head = Sequence(read_u64(&mut file)?);
        let key_count = read_u64(&mut file)? as usize;

        let mut history = HashMap::with_capacity(key_count.min(PREALLOC_LIMIT));
        for _ in 0..key_count {
            let mut len_bytes = [0u8; 4];
            file.read_exact(&mut len_bytes)?;
            let mut key_bytes = vec![0u8; u32::from_le_bytes(len_bytes) as usize];
            file.read_exact(&mut key_bytes)?;
            let key = String::from_utf8(key_bytes)
                .map_err(|_| LedgerError::InvalidFormat("Index key is not UTF-8".into()))?;

            let count = read_u64(&mut file)? as usize;
            let mut positions = Vec::with_capacity(count.min(PREALLOC_LIMIT));
            for _ in 0..count {
                let offset = read_u64(&mut file)?;
                let mut slot_bytes = [0u8; 4];
                file.read_exact(&mut slot_bytes)?;
                let sequence = Sequence(read_u64(&mut file)?);
                let mut flag = [0u8; 1];
                file.read_exact(&mut flag)?;

                positions.push(WritePosition {
                    offset,
                    slot: u32::from_le_bytes(slot_bytes),
                    sequence,
                    is_delete: flag[0] != 0,
                });
            }
            history.insert(key, positions);
        }

        *self.history.get_mut() = history;
        *self.head.get_mut() = head;
        *self.watermark.get_mut() = watermark;
        Ok(())
    }
}

fn read_u64(reader: &mut impl Read) -> Result<u64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}
