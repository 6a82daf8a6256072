//! JSON file helpers shared by the grant store, record store and local document bridge.
//!
//! Every write replaces the target in one step (temp file + rename) so a concurrent reader sees
//! either the old or the new content, never a torn file.
//!
//! Read-modify-write cycles run under an exclusive advisory lock on a `.<name>.lock` sibling,
//! so the server and the CLI can share one data directory without losing each other's writes.

use crate::{PortalError, PortalResult};
use fs2::FileExt;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;

/// Exclusive cross-process lock guarding one data file; released on drop.
#[derive(Debug)]
pub(crate) struct FileLock {
    file: File,
}

impl FileLock {
    /// Block until the lock for `path` is held.
    pub(crate) fn acquire(path: &Path) -> PortalResult<Self> {
        let lock_path = sibling(path, "lock")?;
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PortalError::StorageFailure(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| {
                PortalError::StorageFailure(format!("failed to open {}: {}", lock_path.display(), e))
            })?;
        FileExt::lock_exclusive(&file).map_err(|e| {
            PortalError::StorageFailure(format!("failed to lock {}: {}", lock_path.display(), e))
        })?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Re-read `path` under its lock, apply `f`, and write the result back when `f` reports a change.
///
/// A missing file starts from `T::default()`. Nothing is written if `f` fails.
pub(crate) fn modify_json<T, R>(
    path: &Path,
    f: impl FnOnce(&mut T) -> PortalResult<(bool, R)>,
) -> PortalResult<R>
where
    T: DeserializeOwned + Serialize + Default,
{
    let _lock = FileLock::acquire(path)?;
    let mut value = read_json::<T>(path)?.unwrap_or_default();
    let (changed, result) = f(&mut value)?;
    if changed {
        write_json_atomic(path, &value)?;
    }
    Ok(result)
}

/// `<dir>/.<file name>.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PortalResult<std::path::PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PortalError::InvalidInput(format!("not a file path: {}", path.display())))?;
    Ok(path.with_file_name(format!(".{file_name}.{suffix}")))
}

/// Reads and parses `path`, returning `None` when the file does not exist.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> PortalResult<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PortalError::StorageFailure(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    serde_json::from_str(&contents).map(Some).map_err(|e| {
        PortalError::StorageFailure(format!("failed to parse {}: {}", path.display(), e))
    })
}

/// Serialises `value` and atomically replaces `path` with it.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> PortalResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes())
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> PortalResult<()> {
    let storage_failure = |action: &str, p: &Path, e: std::io::Error| {
        PortalError::StorageFailure(format!("failed to {} {}: {}", action, p.display(), e))
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| storage_failure("create", parent, e))?;
    }

    let tmp_path = sibling(path, "tmp")?;

    fs::write(&tmp_path, bytes).map_err(|e| storage_failure("write", &tmp_path, e))?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(storage_failure("replace", path, e));
    }
    Ok(())
}

/// Rejects identifiers that cannot be used verbatim as a single file name.
pub(crate) fn ensure_file_component(id: &str) -> PortalResult<()> {
    let ok = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
        && !id.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(PortalError::InvalidInput(format!(
            "identifier cannot be used as a file name: '{id}'"
        )))
    }
}
