//! Append-only transaction log.
//!
//! The file starts with a magic/version header, followed by one frame per
//! committed transaction: `[len: u32 LE][crc32: u32 LE][payload]`. The payload
//! is the MessagePack encoding of a [`CommittedTx`]. A transaction is durable
//! exactly when its whole frame is on disk, so every write and the event of
//! one transaction commit together or not at all.

use crate::error::{LedgerError, Result};
use crate::types::{ContractEvent, Sequence, Timestamp, TxId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Magic bytes for the transaction log.
const LOG_MAGIC: &[u8; 4] = b"TXL\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Size of the file header (magic + version).
pub(crate) const LOG_HEADER_SIZE: u64 = 5;

/// Size of a frame header (length + checksum).
const FRAME_HEADER_SIZE: u64 = 8;

/// Upper bound for a single frame payload.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// A single key write inside a transaction. `None` is a tombstone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvWrite {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

impl KvWrite {
    pub fn put(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value: Some(value),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.value.is_none()
    }
}

/// One committed transaction, as framed in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedTx {
    pub tx_id: TxId,
    pub sequence: Sequence,
    pub timestamp: Timestamp,
    /// Name of the operation that produced this transaction.
    pub function: String,
    pub writes: Vec<KvWrite>,
    pub event: Option<ContractEvent>,
}

/// Append-only transaction log.
pub struct TxLog {
    /// Path to the log file.
    path: PathBuf,

    /// Log file handle.
    file: RwLock<File>,

    /// End of the last complete frame.
    file_size: RwLock<u64>,

    /// Number of appends since last sync.
    writes_since_sync: RwLock<u64>,

    /// Sync every N appends.
    sync_interval: u64,

    /// Makes the next data sync fail.
    #[cfg(test)]
    pub(crate) fail_next_sync: AtomicBool,
}

impl TxLog {
    /// Open or create a transaction log.
    ///
    /// A torn or corrupt frame at the tail (a crash mid-append) is cut off;
    /// everything before it is kept.
    pub fn open(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        if file.metadata()?.len() == 0 {
            file.write_all(LOG_MAGIC)?;
            file.write_all(&[LOG_VERSION])?;
            file.sync_all()?;
        } else {
            Self::verify_header(&mut file)?;
        }

        let file_len = file.metadata()?.len();
        let valid_end = Self::find_valid_end(&path, file_len)?;
        if valid_end < file_len {
            warn!(
                path = %path.display(),
                valid_end,
                file_len,
                "discarding torn transaction log tail"
            );
            file.set_len(valid_end)?;
            file.sync_all()?;
        }

        Ok(Self {
            path,
            file: RwLock::new(file),
            file_size: RwLock::new(valid_end),
            writes_since_sync: RwLock::new(0),
            sync_interval: sync_interval.max(1),
            #[cfg(test)]
            fail_next_sync: AtomicBool::new(false),
        })
    }

    /// Append a transaction. Returns the offset of its frame.
    pub fn append(&self, tx: &CommittedTx) -> Result<u64> {
        let payload = rmp_serde::to_vec(tx)?;
        if payload.len() > MAX_FRAME_LEN as usize {
            return Err(LedgerError::Serialization(format!(
                "transaction of {} bytes exceeds frame limit",
                payload.len()
            )));
        }

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE as usize + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);

        let mut file = self.file.write();
        let offset = *self.file_size.read();

        // The frame only becomes part of the log once it is written and, when
        // due, synced. Otherwise it is cut off and the offset reused.
        if let Err(e) = self.write_frame(&mut file, offset, &frame) {
            if let Err(rollback) = file.set_len(offset) {
                warn!(offset, error = %rollback, "failed to cut off unwritten frame");
            }
            return Err(e);
        }
        *self.file_size.write() = offset + frame.len() as u64;

        Ok(offset)
    }

    fn write_frame(&self, file: &mut File, offset: u64, frame: &[u8]) -> Result<()> {
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(frame)?;

        let mut writes = self.writes_since_sync.write();
        if *writes + 1 >= self.sync_interval {
            self.sync_data(file)?;
            *writes = 0;
        } else {
            *writes += 1;
        }
        Ok(())
    }

    fn sync_data(&self, file: &File) -> io::Result<()> {
        #[cfg(test)]
        {
            if self.fail_next_sync.swap(false, Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "injected sync failure"));
            }
        }
        file.sync_data()
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.write();
        file.sync_all()?;
        *self.writes_since_sync.write() = 0;
        Ok(())
    }

    /// Read the transaction framed at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<CommittedTx> {
        let mut file = self.file.write();
        let end = *self.file_size.read();
        read_frame(&mut *file, offset, end).map(|(tx, _)| tx)
    }

    /// Open an independent reader over the log as it is now.
    ///
    /// The reader owns its own file handle; frames appended later are not
    /// visible through it.
    pub fn reader(&self) -> Result<LogReader> {
        LogReader::open(&self.path, self.size())
    }

    /// Iterate all transactions from a given offset.
    pub fn iter_from(&self, offset: u64) -> Result<TxIterator> {
        Ok(TxIterator {
            reader: self.reader()?,
            offset: offset.max(LOG_HEADER_SIZE),
        })
    }

    /// End offset of the last complete frame.
    pub fn size(&self) -> u64 {
        *self.file_size.read()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn verify_header(file: &mut File) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)
            .map_err(|_| LedgerError::InvalidFormat("Truncated log header".into()))?;
        if &magic != LOG_MAGIC {
            return Err(LedgerError::InvalidFormat("Invalid log magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)
            .map_err(|_| LedgerError::InvalidFormat("Truncated log header".into()))?;
        if version[0] != LOG_VERSION {
            return Err(LedgerError::InvalidFormat(format!(
                "Unsupported log version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    /// Walk frames from the header and return the end of the last good one.
    fn find_valid_end(path: &Path, file_len: u64) -> Result<u64> {
        let mut reader = LogReader::open(path, file_len)?;
        let mut offset = LOG_HEADER_SIZE;

        while offset < file_len {
            match reader.read_at(offset) {
                Ok((_, next)) => offset = next,
                Err(LedgerError::Io(e)) if e.kind() != io::ErrorKind::UnexpectedEof => {
                    return Err(LedgerError::Io(e));
                }
                Err(LedgerError::Deserialization(msg)) => {
                    return Err(LedgerError::Corruption(format!(
                        "undecodable frame at offset {}: {}",
                        offset, msg
                    )));
                }
                Err(e) => {
                    if !Self::is_torn_tail(path, offset, file_len)? {
                        return Err(LedgerError::Corruption(format!(
                            "bad frame at offset {} with committed data after it: {}",
                            offset, e
                        )));
                    }
                    warn!(offset, error = %e, "incomplete frame at log tail");
                    break;
                }
            }
        }

        Ok(offset)
    }

    /// Whether the bytes from `offset` to the end can be what a crash in the
    /// middle of one append leaves behind: a prefix of a single frame, or
    /// zero fill.
    fn is_torn_tail(path: &Path, offset: u64, file_len: u64) -> Result<bool> {
        let remainder = file_len - offset;
        if remainder >= FRAME_HEADER_SIZE + MAX_FRAME_LEN as u64 {
            return Ok(false);
        }

        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut tail = vec![0u8; remainder as usize];
        file.read_exact(&mut tail)?;

        if tail.iter().all(|&b| b == 0) {
            return Ok(true);
        }

        // A frame whose declared length fits in the file was written whole.
        if tail.len() >= FRAME_HEADER_SIZE as usize {
            let len = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]) as u64;
            if FRAME_HEADER_SIZE + len <= remainder {
                return Ok(false);
            }
        }

        Ok(!(1..tail.len()).any(|start| holds_frame(&tail[start..])))
    }
}

/// Whether `bytes` starts with a complete frame whose checksum matches.
fn holds_frame(bytes: &[u8]) -> bool {
    if bytes.len() < FRAME_HEADER_SIZE as usize {
        return false;
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let crc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let end = FRAME_HEADER_SIZE as usize + len as usize;
    if len == 0 || len > MAX_FRAME_LEN || end > bytes.len() {
        return false;
    }
    crc32fast::hash(&bytes[FRAME_HEADER_SIZE as usize..end]) == crc
}

/// Read-only view of the log with its own file handle.
///
/// The handle is closed when the reader is dropped.
pub struct LogReader {
    reader: BufReader<File>,
    end: u64,
}

impl LogReader {
    fn open(path: &Path, end: u64) -> Result<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
            end,
        })
    }

    /// Read the frame at `offset`, returning the transaction and the offset
    /// of the next frame.
    pub fn read_at(&mut self, offset: u64) -> Result<(CommittedTx, u64)> {
        read_frame(&mut self.reader, offset, self.end)
    }

    /// End of the readable region.
    pub fn end(&self) -> u64 {
        self.end
    }
}

fn read_frame<R: Read + Seek>(reader: &mut R, offset: u64, end: u64) -> Result<(CommittedTx, u64)> {
    if offset < LOG_HEADER_SIZE || offset + FRAME_HEADER_SIZE > end {
        return Err(LedgerError::Corruption(format!(
            "frame offset {} outside log (end {})",
            offset, end
        )));
    }

    reader.seek(SeekFrom::Start(offset))?;

    let mut header = [0u8; FRAME_HEADER_SIZE as usize];
    reader.read_exact(&mut header)?;
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let expected = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    let next = offset + FRAME_HEADER_SIZE + len as u64;
    if len == 0 || len > MAX_FRAME_LEN || next > end {
        return Err(LedgerError::Corruption(format!(
            "invalid frame length {} at offset {}",
            len, offset
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;

    let got = crc32fast::hash(&payload);
    if got != expected {
        return Err(LedgerError::ChecksumMismatch { expected, got });
    }

    let tx = rmp_serde::from_slice(&payload)?;
    Ok((tx, next))
}

/// Iterator over transactions in the log.
pub struct TxIterator {
    reader: LogReader,
    offset: u64,
}

impl Iterator for TxIterator {
    type Item = Result<(u64, CommittedTx)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.reader.end() {
            return None;
        }

        let current = self.offset;
        match self.reader.read_at(current) {
            Ok((tx, next)) => {
                self.offset = next;
                Some(Ok((current, tx)))
            }
            Err(e) => {
                self.offset = self.reader.end(); // Stop iteration on error
                Some(Err(e))
            }
        }
    }
}
