//! Durable, bounded, newest-first record history.
//!
//! The whole history lives in one JSON document `{ "entries": [...] }`.
//! Every mutation is a load → modify → atomic save under an exclusive lock;
//! reads take a shared lock. A missing or empty file is an empty history,
//! while malformed JSON is reported as [`BusError::Corrupt`] rather than
//! silently discarded.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::fsutil::write_atomic;
use crate::{BusError, Result};

/// An entry stored in a [`HistoryStore`].
pub trait Record: Serialize + DeserializeOwned {
    /// Identifier used by [`HistoryStore::get`]
    fn id(&self) -> &str;

    /// Whether this record describes a failed outcome
    fn failed(&self) -> bool {
        false
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryFile<R> {
    #[serde(default = "Vec::new")]
    entries: Vec<R>,
}

/// File-backed history of `R` records, newest first.
///
/// Saves through one instance are serialized. Separate instances on the same
/// path never corrupt the file, but concurrent saves through them may
/// overwrite each other's additions; share a single store to keep them all.
pub struct HistoryStore<R> {
    path: PathBuf,
    lock: RwLock<()>,
    _records: PhantomData<fn() -> R>,
}

impl<R: Record> HistoryStore<R> {
    /// Open a store at `path`. The file is created lazily on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
            _records: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, newest first.
    pub fn list(&self) -> Result<Vec<R>> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        self.load()
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Look up a record by exact identifier.
    pub fn get(&self, id: &str) -> Result<Option<R>> {
        Ok(self.list()?.into_iter().find(|record| record.id() == id))
    }

    /// The newest record satisfying `predicate`.
    pub fn most_recent_matching<F>(&self, predicate: F) -> Result<Option<R>>
    where
        F: Fn(&R) -> bool,
    {
        Ok(self.list()?.into_iter().find(|record| predicate(record)))
    }

    /// The newest failed record.
    pub fn last_failed(&self) -> Result<Option<R>> {
        self.most_recent_matching(R::failed)
    }

    /// Prepend `record` as the newest entry.
    ///
    /// When `max_entries` is positive the oldest entries beyond it are
    /// discarded; `0` keeps everything.
    pub fn save(&self, record: R, max_entries: usize) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        entries.insert(0, record);
        if max_entries > 0 && entries.len() > max_entries {
            let dropped = entries.len() - max_entries;
            entries.truncate(max_entries);
            tracing::debug!("Pruned {} old history entries from {:?}", dropped, self.path);
        }
        self.store(entries)
    }

    /// Reset to an empty history without deleting the file.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        self.store(Vec::new())
    }

    fn load(&self) -> Result<Vec<R>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BusError::io("reading history file", &self.path, e)),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let file: HistoryFile<R> =
            serde_json::from_str(&content).map_err(|e| BusError::corrupt(&self.path, e))?;
        Ok(file.entries)
    }

    fn store(&self, entries: Vec<R>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&HistoryFile { entries })?;
        write_atomic(&self.path, &bytes)
    }
}

impl<R> std::fmt::Debug for HistoryStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("path", &self.path)
            .finish()
    }
}
