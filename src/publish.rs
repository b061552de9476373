//! Exposes the combined collection inside consumer profile directories.

use crate::error::SyncError;
use crate::links::{is_current, link_or_copy, LinkStrategy};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub symlinked: usize,
    pub hard_linked: usize,
    pub copied: usize,
    /// Targets that already exposed the current content.
    pub skipped: usize,
    /// Dangling links into the collection that were removed.
    pub pruned: usize,
    pub failed: usize,
}

impl PublishReport {
    fn tally(&mut self, strategy: LinkStrategy) {
        match strategy {
            LinkStrategy::Symlink => self.symlinked += 1,
            LinkStrategy::HardLink => self.hard_linked += 1,
            LinkStrategy::Copy => self.copied += 1,
        }
    }
}

/// Links every file of `collection` into each profile directory.
pub fn publish(
    collection: &Path,
    profiles: &[PathBuf],
    strategies: &[LinkStrategy],
) -> Result<PublishReport, SyncError> {
    let collection = collection.canonicalize().map_err(|e| {
        SyncError::Config(format!("collection {:?} is not readable: {}", collection, e))
    })?;

    let mut files = Vec::new();
    for entry in fs::read_dir(&collection)? {
        let entry = entry?;
        if entry.file_type()?.is_file() && !entry.file_name().to_string_lossy().starts_with('.') {
            files.push(entry.path());
        }
    }
    files.sort();

    let mut report = PublishReport::default();
    for profile in profiles {
        if let Err(e) = fs::create_dir_all(profile) {
            error!("❌ Cannot create profile directory {:?}: {}", profile, e);
            report.failed += files.len();
            continue;
        }

        for source in &files {
            let Some(name) = source.file_name() else {
                continue;
            };
            let target = profile.join(name);
            if is_current(source, &target) {
                report.skipped += 1;
                continue;
            }
            match link_or_copy(source, &target, strategies) {
                Ok(strategy) => report.tally(strategy),
                Err(e) => {
                    error!("❌ Failed to publish {:?} to {:?}: {}", source, target, e);
                    report.failed += 1;
                }
            }
        }

        report.pruned += prune_dangling(profile, &collection);
    }

    if report.copied > 0 {
        warn!(
            "{} files were copied rather than linked; re-run publish after each sync",
            report.copied
        );
    }
    info!(
        "Published {} files to {} profile(s): {} symlinked, {} hard-linked, {} copied, {} up to date",
        files.len(),
        profiles.len(),
        report.symlinked,
        report.hard_linked,
        report.copied,
        report.skipped
    );
    Ok(report)
}

/// Removes symlinks in `profile` that point into `collection` at files that no longer exist.
fn prune_dangling(profile: &Path, collection: &Path) -> usize {
    let Ok(entries) = fs::read_dir(profile) else {
        return 0;
    };
    let mut pruned = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(dest) = fs::read_link(&path) else {
            continue;
        };
        if dest.starts_with(collection) && !dest.exists() && fs::remove_file(&path).is_ok() {
            pruned += 1;
        }
    }
    pruned
}
