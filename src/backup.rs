//! Pre-deletion backups of category directories.

use crate::error::SyncError;
use crate::types::{BackupSnapshot, Category};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const BACKUP_DIR: &str = "backups";
const ARCHIVE_PREFIX: &str = "backup-";
const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Archives category directories under `{root}/backups` and prunes old archives.
#[derive(Debug, Clone)]
pub struct BackupSnapshotter {
    root: PathBuf,
    dir: PathBuf,
    retention: usize,
}

impl BackupSnapshotter {
    pub fn new(root: &Path, retention: usize) -> Self {
        Self {
            root: root.to_path_buf(),
            dir: root.join(BACKUP_DIR),
            retention,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copies each category directory into a staging area, compresses the
    /// staging area into `backup-<run_id>.tar.gz`, removes the staging copy and
    /// prunes archives beyond the retention count.
    pub fn snapshot(
        &self,
        run_id: &str,
        categories: &[Category],
    ) -> Result<BackupSnapshot, SyncError> {
        fs::create_dir_all(&self.dir)?;
        let staging = self.dir.join(format!(".staging-{}", run_id));
        let archive = self
            .dir
            .join(format!("{}{}{}", ARCHIVE_PREFIX, run_id, ARCHIVE_SUFFIX));

        let result = self
            .stage(&staging, categories)
            .and_then(|included| {
                write_archive(&staging, &included, &archive)?;
                Ok(included)
            });

        if staging.exists() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                warn!("Failed to remove staging directory {:?}: {}", staging, e);
            }
        }

        let included = result.map_err(|e| {
            let _ = fs::remove_file(&archive);
            SyncError::Backup(format!("{:?}: {}", archive, e))
        })?;

        info!(
            "Backed up {} categories to {:?}",
            included.len(),
            archive
        );

        if let Err(e) = self.prune() {
            warn!("Failed to prune old backups: {}", e);
        }

        Ok(BackupSnapshot {
            run_id: run_id.to_string(),
            categories: included,
            archive,
        })
    }

    fn stage(&self, staging: &Path, categories: &[Category]) -> Result<Vec<Category>, SyncError> {
        fs::create_dir_all(staging)?;
        let mut included = Vec::new();

        for &category in categories {
            let source = self.root.join(category.as_str());
            if !source.is_dir() {
                debug!("Nothing to back up for {}", category);
                continue;
            }
            copy_tree(&source, &staging.join(category.as_str()))?;
            included.push(category);
        }
        Ok(included)
    }

    /// Existing archives, newest first.
    pub fn archives(&self) -> Result<Vec<PathBuf>, SyncError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut archives = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with(ARCHIVE_PREFIX) && name.ends_with(ARCHIVE_SUFFIX)) {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            archives.push((modified, entry.path()));
        }

        archives.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(archives.into_iter().map(|(_, path)| path).collect())
    }

    /// Deletes every archive beyond the retention count, oldest first.
    pub fn prune(&self) -> Result<Vec<PathBuf>, SyncError> {
        let mut removed = Vec::new();
        for stale in self.archives()?.into_iter().skip(self.retention) {
            fs::remove_file(&stale)?;
            debug!("Pruned old backup {:?}", stale);
            removed.push(stale);
        }
        Ok(removed)
    }
}

fn copy_tree(source: &Path, target: &Path) -> Result<(), SyncError> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| SyncError::IoError(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| SyncError::IoError(std::io::Error::other(e)))?;
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

fn write_archive(
    staging: &Path,
    categories: &[Category],
    archive: &Path,
) -> Result<(), SyncError> {
    let file = fs::File::create(archive)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for category in categories {
        builder.append_dir_all(category.as_str(), staging.join(category.as_str()))?;
    }

    builder.into_inner()?.finish()?;
    Ok(())
}
