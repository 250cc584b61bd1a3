// ── Atomic file replacement ──
//
// Write to a temporary file in the target directory, sync, then rename
// over the target. A crash mid-write leaves the previous version intact.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::CoreError;

fn persistence_error(path: &Path, reason: impl ToString) -> CoreError {
    CoreError::PersistenceError {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Replace `path` with `contents` atomically.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<(), CoreError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| persistence_error(path, e))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| persistence_error(path, e))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| persistence_error(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| persistence_error(path, e))?;
    tmp.persist(path)
        .map_err(|e| persistence_error(path, e.error))?;
    Ok(())
}

/// `write_atomic` on the blocking pool.
pub(crate) async fn write_atomic_async(path: PathBuf, contents: String) -> Result<(), CoreError> {
    let target = path.clone();
    tokio::task::spawn_blocking(move || write_atomic(&path, &contents))
        .await
        .map_err(|e| persistence_error(&target, format!("writer task failed: {e}")))?
}

/// Read a file that may not exist yet.
pub(crate) async fn read_optional(path: PathBuf) -> Result<Option<String>, CoreError> {
    let target = path.clone();
    tokio::task::spawn_blocking(move || match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(persistence_error(&path, e)),
    })
    .await
    .map_err(|e| persistence_error(&target, format!("reader task failed: {e}")))?
}
