//! WAL-backed contact store.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::contact::{Contact, ContactId};
use crate::error::{ContactError, ContactResult};
use crate::storage::index::ContactIndex;
use crate::storage::staged::{SharedState, StagedTransaction};
use crate::storage::traits::{ContactStore, ContactTransaction, StorageError};

use super::codec::{self, FileKind};
use super::file_lock::FileLock;
use super::wal::{WalEntryKind, WriteAheadLog};
use super::PersistentConfig;

const WAL_FILE: &str = "contacts.wal";
const SNAPSHOT_FILE: &str = "contacts.snap";
const SNAPSHOT_TMP: &str = "contacts.snap.tmp";

/// Full state as of a WAL sequence number.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    sequence: u64,
    contacts: Vec<Contact>,
}

fn storage_err(context: &str, e: impl std::fmt::Display) -> ContactError {
    ContactError::storage(format!("{context}: {e}"))
}

fn read_snapshot(path: &Path) -> ContactResult<Snapshot> {
    if !path.exists() {
        return Ok(Snapshot::default());
    }
    let file = File::open(path).map_err(|e| storage_err("failed to open snapshot", e))?;
    let mut reader = BufReader::new(file);
    codec::read_header(&mut reader, FileKind::Snapshot).map_err(|e| storage_err("invalid snapshot header", e))?;
    codec::decode(&mut reader).map_err(|e| storage_err("corrupted snapshot", e))
}

fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> std::io::Result<()> {
    let tmp = dir.join(SNAPSHOT_TMP);
    {
        let mut out = BufWriter::new(File::create(&tmp)?);
        codec::write_header(&mut out, FileKind::Snapshot)?;
        out.write_all(&codec::encode(snapshot)?)?;
        out.flush()?;
        out.get_ref().sync_all()?;
    }
    fs::rename(&tmp, dir.join(SNAPSHOT_FILE))
}

/// Outcome of [`PersistentContactStore::compact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    /// Contacts written to the snapshot.
    pub contacts_written: usize,
    /// WAL sequence the snapshot covers.
    pub sequence: u64,
    /// WAL size before compaction.
    pub wal_size_before: u64,
    /// WAL size after compaction.
    pub wal_size_after: u64,
}

/// Durable [`ContactStore`].
///
/// Opening takes an exclusive lock on the directory, loads the snapshot and
/// replays the WAL on top of it.
pub struct PersistentContactStore {
    dir: PathBuf,
    shared: SharedState,
    wal: WriteAheadLog,
    snapshot_sequence: std::sync::atomic::AtomicU64,
    _lock: FileLock,
}

impl std::fmt::Debug for PersistentContactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentContactStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl PersistentContactStore {
    pub(crate) fn open(dir: &Path, config: PersistentConfig) -> ContactResult<Self> {
        fs::create_dir_all(dir).map_err(|e| storage_err("failed to create database directory", e))?;
        let lock = FileLock::acquire(dir).map_err(|e| storage_err("failed to acquire lock", e))?;

        // A leftover temp file means a crash mid-compaction; the WAL still has everything.
        let tmp = dir.join(SNAPSHOT_TMP);
        if tmp.exists() {
            fs::remove_file(&tmp).map_err(|e| storage_err("failed to remove stale snapshot", e))?;
        }

        let snapshot = read_snapshot(&dir.join(SNAPSHOT_FILE))?;
        let (wal, entries) = WriteAheadLog::open(&dir.join(WAL_FILE), config.sync_on_write, snapshot.sequence)
            .map_err(|e| storage_err("failed to open WAL", e))?;

        let loaded = snapshot.contacts.len();
        let mut index = ContactIndex::from_contacts(snapshot.contacts)
            .map_err(|e| storage_err("invalid snapshot", e))?;

        let mut replayed = 0usize;
        for entry in entries {
            if entry.sequence <= snapshot.sequence {
                continue;
            }
            match entry.kind {
                WalEntryKind::Commit(batch) => {
                    index.apply(&batch).map_err(|e| {
                        storage_err(&format!("failed to replay WAL entry {}", entry.sequence), e)
                    })?;
                }
            }
            replayed += 1;
        }
        info!(
            dir = %dir.display(),
            snapshot_contacts = loaded,
            replayed_commits = replayed,
            "opened contact database"
        );

        let store = Self {
            dir: dir.to_path_buf(),
            shared: SharedState::from_index(index),
            wal,
            snapshot_sequence: std::sync::atomic::AtomicU64::new(snapshot.sequence),
            _lock: lock,
        };

        if store.wal_size()? > config.max_wal_size {
            store.compact()?;
        }
        Ok(store)
    }

    /// The database directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current WAL size in bytes.
    ///
    /// # Errors
    /// If the WAL file cannot be inspected.
    pub fn wal_size(&self) -> ContactResult<u64> {
        self.wal.size_bytes().map_err(|e| storage_err("failed to stat WAL", e))
    }

    /// Number of stored contacts.
    ///
    /// # Errors
    /// If the index lock is poisoned.
    pub fn len(&self) -> ContactResult<usize> {
        Ok(self.shared.read()?.len())
    }

    /// Returns true if nothing is stored.
    ///
    /// # Errors
    /// If the index lock is poisoned.
    pub fn is_empty(&self) -> ContactResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Fold the WAL into a fresh snapshot and truncate it.
    ///
    /// Commits are blocked while this runs. A crash at any point leaves a
    /// state that reopens correctly: the snapshot is swapped in by rename and
    /// WAL entries it already covers are skipped on replay.
    ///
    /// # Errors
    /// If the snapshot cannot be written or the WAL cannot be truncated.
    pub fn compact(&self) -> ContactResult<CompactionResult> {
        use std::sync::atomic::Ordering;

        let wal_size_before = self.wal_size()?;
        let result = self.shared.with_index_exclusive(|index| {
            let sequence = self
                .wal
                .current_sequence()
                .map_err(|e| StorageError::BackendError(e.to_string()))?;
            if sequence == self.snapshot_sequence.load(Ordering::Acquire) {
                return Ok(None);
            }

            let snapshot = Snapshot {
                sequence,
                contacts: index.contacts().cloned().collect(),
            };
            write_snapshot(&self.dir, &snapshot)
                .map_err(|e| StorageError::BackendError(format!("failed to write snapshot: {e}")))?;
            self.snapshot_sequence.store(sequence, Ordering::Release);
            self.wal
                .truncate()
                .map_err(|e| StorageError::BackendError(format!("failed to truncate WAL: {e}")))?;
            Ok(Some((snapshot.contacts.len(), sequence)))
        })?;

        let wal_size_after = self.wal_size()?;
        let (contacts_written, sequence) =
            result.unwrap_or((0, self.snapshot_sequence.load(Ordering::Acquire)));
        debug!(contacts_written, sequence, wal_size_before, wal_size_after, "compacted WAL");
        Ok(CompactionResult {
            contacts_written,
            sequence,
            wal_size_before,
            wal_size_after,
        })
    }
}

impl ContactStore for PersistentContactStore {
    fn begin(&self) -> Result<Box<dyn ContactTransaction + '_>, StorageError> {
        Ok(Box::new(StagedTransaction::new(&self.shared, Some(&self.wal))))
    }

    fn all_contacts(&self) -> Result<Vec<Contact>, StorageError> {
        self.shared.all_contacts()
    }

    fn get(&self, id: ContactId) -> Result<Option<Contact>, StorageError> {
        self.shared.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::contact::NewContact;

    fn config() -> PersistentConfig {
        PersistentConfig {
            sync_on_write: false,
            ..PersistentConfig::default()
        }
    }

    #[test]
    fn test_commits_survive_reopen() {
        let dir = tempdir().unwrap();
        let id = {
            let store = PersistentContactStore::open(dir.path(), config()).unwrap();
            let mut tx = store.begin().unwrap();
            let c = tx.insert(NewContact::primary(Some("marty@hillvalley.edu".into()), None)).unwrap();
            tx.commit().unwrap();
            c.id
        };

        let store = PersistentContactStore::open(dir.path(), config()).unwrap();
        let c = store.get(id).unwrap().unwrap();
        assert_eq!(c.email.as_deref(), Some("marty@hillvalley.edu"));
    }

    #[test]
    fn test_rolled_back_transaction_is_not_logged() {
        let dir = tempdir().unwrap();
        {
            let store = PersistentContactStore::open(dir.path(), config()).unwrap();
            let mut tx = store.begin().unwrap();
            tx.insert(NewContact::primary(Some("a@x".into()), None)).unwrap();
        }
        let store = PersistentContactStore::open(dir.path(), config()).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_compaction_then_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = PersistentContactStore::open(dir.path(), config()).unwrap();
            for i in 0..10 {
                let mut tx = store.begin().unwrap();
                tx.insert(NewContact::primary(Some(format!("{i}@x")), None)).unwrap();
                tx.commit().unwrap();
            }
            let result = store.compact().unwrap();
            assert_eq!(result.contacts_written, 10);
            assert_eq!(result.sequence, 10);
            assert!(result.wal_size_after < result.wal_size_before);

            let mut tx = store.begin().unwrap();
            tx.insert(NewContact::primary(Some("late@x".into()), None)).unwrap();
            tx.commit().unwrap();
        }

        let store = PersistentContactStore::open(dir.path(), config()).unwrap();
        assert_eq!(store.len().unwrap(), 11);
        assert!(dir.path().join(SNAPSHOT_FILE).exists());
    }

    #[test]
    fn test_compaction_without_new_commits_is_noop() {
        let dir = tempdir().unwrap();
        let store = PersistentContactStore::open(dir.path(), config()).unwrap();
        let result = store.compact().unwrap();
        assert_eq!(result.contacts_written, 0);
        assert!(!dir.path().join(SNAPSHOT_FILE).exists());
    }

    #[test]
    fn test_ids_continue_after_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = PersistentContactStore::open(dir.path(), config()).unwrap();
            let mut tx = store.begin().unwrap();
            tx.insert(NewContact::primary(Some("a@x".into()), None)).unwrap();
            tx.insert(NewContact::primary(Some("b@x".into()), None)).unwrap();
            tx.commit().unwrap();
        }
        let store = PersistentContactStore::open(dir.path(), config()).unwrap();
        let mut tx = store.begin().unwrap();
        let c = tx.insert(NewContact::primary(Some("c@x".into()), None)).unwrap();
        assert_eq!(c.id, ContactId::new(3));
    }

    #[test]
    fn test_second_open_is_locked_out() {
        let dir = tempdir().unwrap();
        let _store = PersistentContactStore::open(dir.path(), config()).unwrap();
        let err = PersistentContactStore::open(dir.path(), config()).unwrap_err();
        assert!(err.to_string().contains("lock"));
    }
}
