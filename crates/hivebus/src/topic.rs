//! Topic files and the topic ⇄ filename encoding.
//!
//! A topic is stored as `<encoded>.json` where every `/` in the topic name
//! becomes `_`. Decoding maps every `_` back to `/`, so topic names that
//! contain a literal underscore do not survive the round trip.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::fsutil::{write_atomic, TMP_SUFFIX};
use crate::{BusError, Result};

/// Extension of every topic file
pub const TOPIC_EXTENSION: &str = ".json";

/// Suffix of lock files some writers leave next to topic files
pub const LOCK_SUFFIX: &str = ".lock";

/// Map a topic name to its file name.
pub fn topic_to_filename(topic: &str) -> String {
    format!("{}{}", topic.replace('/', "_"), TOPIC_EXTENSION)
}

/// Check whether a file name denotes a topic file.
///
/// Temp and lock artifacts from atomic writers are never topic files.
pub fn is_topic_file(file_name: &str) -> bool {
    file_name.len() > TOPIC_EXTENSION.len()
        && file_name.ends_with(TOPIC_EXTENSION)
        && !file_name.ends_with(TMP_SUFFIX)
        && !file_name.ends_with(LOCK_SUFFIX)
}

/// Recover the topic name from a file name, or `None` for non-topic files.
pub fn filename_to_topic(file_name: &str) -> Option<String> {
    if !is_topic_file(file_name) {
        return None;
    }
    let stem = &file_name[..file_name.len() - TOPIC_EXTENSION.len()];
    Some(stem.replace('_', "/"))
}

/// A directory holding one JSON document per topic.
///
/// Writers publish with atomic replace; readers use [`TopicDir::read`] after
/// receiving a [`TopicEvent`](crate::TopicEvent) for the topic.
#[derive(Debug, Clone)]
pub struct TopicDir {
    root: PathBuf,
}

impl TopicDir {
    /// Refer to a topic directory without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Refer to a topic directory, creating it if absent.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| BusError::io("creating topic directory", &root, e))?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `topic`.
    pub fn path_for(&self, topic: &str) -> PathBuf {
        self.root.join(topic_to_filename(topic))
    }

    /// Atomically replace the document for `topic`.
    pub fn publish<T: Serialize + ?Sized>(&self, topic: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let path = self.path_for(topic);
        write_atomic(&path, &bytes)?;
        tracing::trace!("Published topic {} to {:?}", topic, path);
        Ok(())
    }

    /// Read the current document for `topic`.
    ///
    /// Returns `Ok(None)` when the topic has never been published and an
    /// error when the document is not valid JSON for `T`.
    pub fn read<T: DeserializeOwned>(&self, topic: &str) -> Result<Option<T>> {
        let path = self.path_for(topic);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BusError::io("reading topic file", &path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| BusError::corrupt(&path, e))
    }

    /// List the topics currently present, sorted by name.
    pub fn topics(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BusError::io("listing topic directory", &self.root, e)),
        };

        let mut topics: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| filename_to_topic(&entry.file_name().to_string_lossy()))
            .collect();
        topics.sort();
        Ok(topics)
    }
}
