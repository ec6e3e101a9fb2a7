//! Crash-safe JSON document I/O.
//!
//! Every persisted document goes through [`write_atomic`]: the bytes land in a
//! hidden temp file next to the target, are fsynced, then renamed over it. A
//! reader never observes a half-written document.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, WatchError};

/// Atomically replace `path` with `bytes`, creating parent directories.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    let written =
        write_and_sync(&tmp_path, bytes).and_then(|()| std::fs::rename(&tmp_path, path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| WatchError::persistence(path, format!("cannot serialize: {e}")))?;
    write_atomic(path, &json)
        .map_err(|e| WatchError::persistence(path, format!("cannot write: {e}")))
}

/// Read and decode a JSON document. `Ok(None)` when the file does not exist.
///
/// Unparseable or schema-mismatched content is an error; the file is left
/// untouched.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(WatchError::persistence(path, format!("cannot read: {e}")));
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| WatchError::persistence(path, format!("cannot parse: {e}")))
}

/// Remove a document if present.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WatchError::persistence(path, format!("cannot remove: {e}"))),
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_owned());
    path.with_file_name(format!(".{name}.tmp"))
}
