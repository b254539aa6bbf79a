//! Filesystem primitives shared by the backends.
//!
//! All functions map I/O failures onto [`Error::OperationFailed`]; callers
//! decide whether a failure aborts the surrounding operation or is logged
//! and skipped.

use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Returns whether `path` exists.
pub(crate) fn exists(path: &Path) -> bool {
    path.exists()
}

/// Reads a file fully, `None` when it is absent.
pub(crate) fn read_to_string(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .map_err(|e| Error::OperationFailed {
            operation: "read_file".to_string(),
            cause: e.to_string(),
        })
}

/// Atomically replaces `path` with `data`.
///
/// Writes to a `.tmp` sibling first and renames over the target, so a crash
/// mid-write cannot corrupt the previous contents.
pub(crate) fn write_atomic(path: &Path, data: &str) -> Result<()> {
    let tmp = with_suffix(path, ".tmp");
    fs::write(&tmp, data).map_err(|e| Error::OperationFailed {
        operation: "write_temp_file".to_string(),
        cause: e.to_string(),
    })?;
    fs::rename(&tmp, path).map_err(|e| Error::OperationFailed {
        operation: "commit_temp_file".to_string(),
        cause: e.to_string(),
    })
}

/// Renames `from` to `to`.
pub(crate) fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| Error::OperationFailed {
        operation: "rename_file".to_string(),
        cause: e.to_string(),
    })
}

/// Deletes `path`. With `ignore_absent`, a missing file is not an error.
pub(crate) fn remove(path: &Path, ignore_absent: bool) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if ignore_absent && e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::OperationFailed {
            operation: "remove_file".to_string(),
            cause: e.to_string(),
        }),
    }
}

/// Appends `suffix` to a full path, keeping the original extension.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Checks that a database or collection name is safe to embed in file names
/// and quoted SQL identifiers.
///
/// Only alphanumerics, dashes, and underscores are allowed; this is the
/// barrier against path traversal and identifier injection.
pub(crate) fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}
