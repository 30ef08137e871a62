//! Atomic file replacement shared by topic files and the history store.
//!
//! Readers of the destination path see either the old document or the new
//! one in full. The rename is the only visibility boundary.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{BusError, Result};

/// Suffix used for in-flight temporary files. The topic watcher ignores it.
pub const TMP_SUFFIX: &str = ".tmp";

/// Sequence number distinguishing temp files written by this process.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Fresh temporary sibling path for `path`.
///
/// Hidden and ending in [`TMP_SUFFIX`]. The name carries the process id and
/// a per-call sequence number, so no two calls (in any thread or process)
/// return the same path.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(
        ".{}.{}.{}{}",
        name,
        std::process::id(),
        seq,
        TMP_SUFFIX
    ))
}

/// Write `bytes` to `path` via a temp file and rename.
///
/// Creates the parent directory if needed. On failure the temp file is
/// removed and the destination is left untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| BusError::io("creating parent directory", parent, e))?;
        }
    }

    let tmp = temp_path_for(path);
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(BusError::io("writing temporary file", &tmp, e));
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(BusError::io("renaming temporary file into place", path, e));
    }
    Ok(())
}
