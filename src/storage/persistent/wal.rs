//! Write-ahead log of committed transactions.
//!
//! Every committed transaction is exactly one [`WalEntryKind::Commit`] entry,
//! appended (and optionally fsynced) before the batch becomes visible to
//! readers. Sequence numbers keep increasing across compactions so entries
//! already folded into a snapshot can be recognized and skipped.
//!
//! # File Format
//! ```text
//! [MAGIC "CGWL": 4 bytes][FORMAT VERSION: 1 byte]
//! [ENTRY 1: codec-encoded WalEntry]
//! [ENTRY 2: codec-encoded WalEntry]
//! ...
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Error as IoError, ErrorKind, Result as IoResult, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::storage::index::CommitBatch;
use crate::storage::staged::CommitLog;
use crate::storage::traits::StorageError;

use super::codec::{self, FileKind, HEADER_LEN};

/// A single entry in the write-ahead log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing sequence number.
    pub sequence: u64,
    /// When this entry was written.
    pub timestamp: DateTime<Utc>,
    /// The logged operation.
    pub kind: WalEntryKind,
}

/// What a WAL entry records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalEntryKind {
    /// All writes of one committed transaction.
    Commit(CommitBatch),
}

struct WalWriter {
    out: File,
    sequence: u64,
    /// Set when a failed append could not be undone; the file may end in a
    /// partial frame, so nothing more may be appended after it.
    poisoned: bool,
}

/// Append-only log. Thread-safe via an internal mutex.
pub(crate) struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<WalWriter>,
    sync_on_write: bool,
}

fn lock_poisoned() -> IoError {
    IoError::new(ErrorKind::Other, "poisoned lock: wal.writer")
}

fn write_frame(out: &mut File, frame: &[u8], sync: bool) -> IoResult<()> {
    out.write_all(frame)?;
    if sync {
        out.sync_data()?;
    }
    Ok(())
}

impl WriteAheadLog {
    /// Open or create the log at `path` and return the entries it holds.
    ///
    /// A torn final entry (cut short by a crash mid-append) is dropped and the
    /// file truncated back to the last whole entry. New entries are numbered
    /// after both the last recovered entry and `floor_sequence`.
    ///
    /// # Errors
    /// - `InvalidData` if an entry fails its checksum or the header is foreign
    pub(crate) fn open(path: &Path, sync_on_write: bool, floor_sequence: u64) -> IoResult<(Self, Vec<WalEntry>)> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let (entries, valid_len) = if file.metadata()?.len() < HEADER_LEN {
            file.set_len(0)?;
            codec::write_header(&mut file, FileKind::Wal)?;
            file.sync_all()?;
            (Vec::new(), HEADER_LEN)
        } else {
            scan(&mut file)?
        };

        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                dropped_bytes = file_len - valid_len,
                "truncating torn WAL tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let last = entries.last().map_or(0, |e| e.sequence);
        let out = OpenOptions::new().append(true).open(path)?;
        let wal = Self {
            path: path.to_path_buf(),
            writer: Mutex::new(WalWriter {
                out,
                sequence: last.max(floor_sequence),
                poisoned: false,
            }),
            sync_on_write,
        };
        Ok((wal, entries))
    }

    /// Append an entry and return its sequence number.
    ///
    /// Either the whole entry is durable when this returns `Ok`, or the file
    /// is cut back to where it was and the error returned.
    pub(crate) fn append(&self, kind: WalEntryKind) -> IoResult<u64> {
        let mut w = self.writer.lock().map_err(|_| lock_poisoned())?;
        if w.poisoned {
            return Err(IoError::new(
                ErrorKind::Other,
                "WAL refuses appends after an unrecoverable write failure",
            ));
        }
        let entry = WalEntry {
            sequence: w.sequence + 1,
            timestamp: Utc::now(),
            kind,
        };
        let encoded = codec::encode(&entry)?;
        let start = w.out.metadata()?.len();

        if let Err(e) = write_frame(&mut w.out, &encoded, self.sync_on_write) {
            if let Err(undo) = w.out.set_len(start) {
                w.poisoned = true;
                error!(path = %self.path.display(), error = %e, undo_error = %undo, "WAL append failed and could not be undone");
                return Err(IoError::new(e.kind(), format!("{e}; rollback to {start} bytes failed: {undo}")));
            }
            warn!(path = %self.path.display(), error = %e, sequence = entry.sequence, "WAL append failed, rolled back");
            return Err(e);
        }

        w.sequence = entry.sequence;
        Ok(entry.sequence)
    }

    /// Sequence number of the last appended entry.
    pub(crate) fn current_sequence(&self) -> IoResult<u64> {
        Ok(self.writer.lock().map_err(|_| lock_poisoned())?.sequence)
    }

    /// WAL file size in bytes.
    pub(crate) fn size_bytes(&self) -> IoResult<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Drop every entry, keeping the header and the sequence counter.
    ///
    /// Only call once the entries are covered by a durable snapshot. A log
    /// refusing appends accepts them again afterwards, since whatever partial
    /// frame it ended in is gone.
    pub(crate) fn truncate(&self) -> IoResult<()> {
        let mut w = self.writer.lock().map_err(|_| lock_poisoned())?;
        w.out.set_len(0)?;
        codec::write_header(&mut w.out, FileKind::Wal)?;
        w.out.sync_all()?;
        w.poisoned = false;
        Ok(())
    }
}

impl CommitLog for WriteAheadLog {
    fn append(&self, batch: &CommitBatch) -> Result<(), StorageError> {
        WriteAheadLog::append(self, WalEntryKind::Commit(batch.clone()))
            .map(|_| ())
            .map_err(|e| StorageError::BackendError(format!("WAL append failed: {e}")))
    }
}

/// Read every whole entry. Returns the entries and the byte length they span.
fn scan(file: &mut File) -> IoResult<(Vec<WalEntry>, u64)> {
    file.rewind()?;
    let mut reader = BufReader::new(&*file);
    codec::read_header(&mut reader, FileKind::Wal)?;

    let mut entries = Vec::new();
    let mut valid_len = HEADER_LEN;
    loop {
        if reader.fill_buf()?.is_empty() {
            break;
        }
        match codec::decode::<WalEntry>(&mut reader) {
            Ok(entry) => {
                valid_len = reader.stream_position()?;
                entries.push(entry);
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => {
                let after = entries.last().map_or(0, |x: &WalEntry| x.sequence);
                return Err(IoError::new(e.kind(), format!("corrupted WAL entry after sequence {after}: {e}")));
            }
        }
    }
    Ok((entries, valid_len))
}
