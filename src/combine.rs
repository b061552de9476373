//! Merge of category directories into one flat collection.

use crate::error::SyncError;
use crate::fsutil::write_atomic;
use crate::hash::digest_bytes;
use crate::types::Category;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CombineReport {
    pub written: usize,
    pub unchanged: usize,
    /// Same name, same content in more than one category.
    pub duplicates: usize,
    /// Same name, different content; the first category won.
    pub conflicts: Vec<String>,
    /// Files left over from a previous combine and deleted.
    pub removed: usize,
}

struct Candidate {
    source: PathBuf,
    hash: String,
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Flattens `{root}/{category}/**` into `target/{file name}`.
pub fn combine(
    root: &Path,
    categories: &[Category],
    target: &Path,
) -> Result<CombineReport, SyncError> {
    let mut report = CombineReport::default();
    let mut chosen: BTreeMap<String, Candidate> = BTreeMap::new();

    for category in categories {
        let dir = root.join(category.as_str());
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| SyncError::IoError(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_hidden(&name) {
                continue;
            }
            let hash = digest_bytes(&fs::read(entry.path())?);

            match chosen.get(&name) {
                Some(existing) if existing.hash == hash => report.duplicates += 1,
                Some(existing) => {
                    warn!(
                        "Conflicting {}: keeping {:?}, ignoring {:?}",
                        name,
                        existing.source,
                        entry.path()
                    );
                    report.conflicts.push(name);
                }
                None => {
                    chosen.insert(
                        name,
                        Candidate {
                            source: entry.path().to_path_buf(),
                            hash,
                        },
                    );
                }
            }
        }
    }

    fs::create_dir_all(target)?;
    for (name, candidate) in &chosen {
        let destination = target.join(name);
        let current = fs::read(&destination).ok().map(|b| digest_bytes(&b));
        if current.as_deref() == Some(candidate.hash.as_str()) {
            report.unchanged += 1;
            continue;
        }
        write_atomic(&destination, &fs::read(&candidate.source)?)?;
        report.written += 1;
    }

    for entry in fs::read_dir(target)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) || !entry.file_type()?.is_file() || chosen.contains_key(&name) {
            continue;
        }
        fs::remove_file(entry.path())?;
        report.removed += 1;
    }

    info!(
        "Combined {} files into {:?} ({} written, {} unchanged, {} duplicates, {} conflicts, {} removed)",
        chosen.len(),
        target,
        report.written,
        report.unchanged,
        report.duplicates,
        report.conflicts.len(),
        report.removed
    );
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
    fn flattens_and_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        let target = dir.path().join("combined");
        put(&root, "chatmodes/a.chatmode.md", "a");
        put(&root, "prompts/nested/b.prompt.md", "b");
        put(&root, "prompts/a.chatmode.md", "a");
        put(&root, "instructions/b.prompt.md", "other b");

        let report = combine(
            &root,
            &[Category::Chatmodes, Category::Instructions, Category::Prompts],
            &target,
        )
        .unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.conflicts, vec!["b.prompt.md".to_string()]);
        assert_eq!(fs::read_to_string(target.join("a.chatmode.md")).unwrap(), "a");
        // instructions precedes prompts, so its copy wins.
        assert_eq!(
            fs::read_to_string(target.join("b.prompt.md")).unwrap(),
            "other b"
        );
    }

    #[test]
    fn second_combine_is_a_no_op_and_prunes_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        let target = dir.path().join("combined");
        put(&root, "prompts/a.prompt.md", "a");
        combine(&root, &[Category::Prompts], &target).unwrap();

        fs::write(target.join("old.prompt.md"), "stale").unwrap();
        let report = combine(&root, &[Category::Prompts], &target).unwrap();

        assert_eq!(report.written, 0);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.removed, 1);
        assert!(!target.join("old.prompt.md").exists());
    }
}
