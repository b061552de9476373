//! Relocates resources filed under the wrong category directory.

use crate::error::SyncError;
use crate::hash::digest_bytes;
use crate::types::Category;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NormalizeReport {
    /// `(from, to)` pairs of relocated files.
    pub moved: Vec<(PathBuf, PathBuf)>,
    /// Misfiled copies dropped because the correct location already held them.
    pub dropped_duplicates: usize,
    /// Misfiled files left in place because the correct location differs.
    pub conflicts: Vec<PathBuf>,
}

/// Moves every top-level file whose suffix names another category into that
/// category's directory under `root`.
pub fn normalize(root: &Path, categories: &[Category]) -> Result<NormalizeReport, SyncError> {
    let mut report = NormalizeReport::default();

    for &category in categories {
        let dir = root.join(category.as_str());
        if !dir.is_dir() {
            continue;
        }

        let mut misfiled = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(owner) = Category::from_suffix(&name).filter(|owner| *owner != category) {
                misfiled.push((entry.path(), owner, name));
            }
        }
        misfiled.sort();

        for (source, owner, name) in misfiled {
            let target = root.join(owner.as_str()).join(&name);
            if target.exists() {
                if digest_bytes(&fs::read(&source)?) == digest_bytes(&fs::read(&target)?) {
                    fs::remove_file(&source)?;
                    report.dropped_duplicates += 1;
                } else {
                    warn!(
                        "Leaving {:?} in place: {:?} already exists with different content",
                        source, target
                    );
                    report.conflicts.push(source);
                }
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            if fs::rename(&source, &target).is_err() {
                fs::copy(&source, &target)?;
                fs::remove_file(&source)?;
            }
            info!("Moved {:?} -> {:?}", source, target);
            report.moved.push((source, target));
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn moves_misfiled_resources() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        put(root, "prompts/focus.chatmode.md", "mode");
        put(root, "prompts/review.prompt.md", "prompt");
        put(root, "prompts/README.md", "readme");

        let report = normalize(root, &Category::ALL).unwrap();

        assert_eq!(report.moved.len(), 1);
        assert_eq!(
            fs::read_to_string(root.join("chatmodes/focus.chatmode.md")).unwrap(),
            "mode"
        );
        assert!(!root.join("prompts/focus.chatmode.md").exists());
        assert!(root.join("prompts/review.prompt.md").exists());
        assert!(root.join("prompts/README.md").exists());
    }

    #[test]
    fn duplicates_are_dropped_and_conflicts_kept() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        put(root, "instructions/same.prompt.md", "x");
        put(root, "prompts/same.prompt.md", "x");
        put(root, "instructions/diff.prompt.md", "mine");
        put(root, "prompts/diff.prompt.md", "theirs");

        let report = normalize(root, &Category::ALL).unwrap();

        assert_eq!(report.dropped_duplicates, 1);
        assert_eq!(report.conflicts, vec![root.join("instructions/diff.prompt.md")]);
        assert!(!root.join("instructions/same.prompt.md").exists());
        assert_eq!(
            fs::read_to_string(root.join("prompts/diff.prompt.md")).unwrap(),
            "theirs"
        );
    }
}
