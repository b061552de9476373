//! Filesystem helpers shared by the destination tree and the manifest store.

use crate::error::SyncError;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Replaces `path` with `content` in one step.
///
/// The bytes go to a temp file in the same directory which is then renamed
/// over the target, so readers see either the old file or the complete new one.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)?;
    if let Err(e) = temp_file
        .write_all(content)
        .and_then(|_| temp_file.sync_all())
    {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    drop(temp_file);

    // A symlink at the target is replaced, never followed.
    if fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink()) {
        fs::remove_file(path)?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Joins a remote-supplied relative path onto `root`, rejecting anything that
/// could escape it.
pub fn safe_join(root: &Path, relative: &str) -> Result<PathBuf, SyncError> {
    let candidate = Path::new(relative);
    if relative.is_empty() || relative.contains('\\') {
        return Err(SyncError::UnsafePath(relative.to_string()));
    }

    let mut joined = root.to_path_buf();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            _ => return Err(SyncError::UnsafePath(relative.to_string())),
        }
    }
    Ok(joined)
}

/// Removes a file, treating "already gone" as success.
pub fn remove_if_present(path: &Path) -> Result<bool, SyncError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
