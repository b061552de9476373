//! Human-readable run summary written next to the manifest.

use crate::error::SyncError;
use crate::fsutil::write_atomic;
use crate::types::{Category, SyncOutcome};
use std::fmt::Write as _;
use std::path::Path;

pub const STATUS_FILE: &str = "status.txt";

fn join(categories: &[Category]) -> String {
    if categories.is_empty() {
        return "none".to_string();
    }
    categories
        .iter()
        .map(Category::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders the status report for a finished run.
pub fn render(outcome: &SyncOutcome, manifest_path: &Path) -> String {
    let mut out = String::new();
    let s = &outcome.summary;

    let _ = writeln!(out, "Last sync: {}", outcome.manifest.fetched_at);
    let _ = writeln!(out, "Repository: {}", outcome.manifest.repo);
    let _ = writeln!(
        out,
        "Duration: {}",
        humantime::format_duration(std::time::Duration::from_secs(outcome.elapsed.as_secs()))
    );
    let _ = writeln!(
        out,
        "Categories fetched: {}",
        join(&outcome.successful_categories)
    );
    let _ = writeln!(
        out,
        "Categories failed: {}",
        join(&outcome.failed_categories)
    );
    let _ = writeln!(
        out,
        "Added: {}  Updated: {}  Removed: {}  Unchanged: {}",
        s.added, s.updated, s.removed, s.unchanged
    );
    let _ = writeln!(out, "Tracked files: {}", outcome.manifest.items.len());

    if outcome.rate_limited {
        let _ = writeln!(out, "WARNING: rate limited by remote; deletions skipped");
    }
    if outcome.timed_out {
        let _ = writeln!(out, "WARNING: run exceeded its time budget; deletions skipped");
    }
    if let Some(backup) = &outcome.backup {
        let _ = writeln!(out, "Backup: {}", backup.archive.display());
    }

    match &outcome.marker {
        Some(marker) => {
            let _ = writeln!(
                out,
                "Manifest: {} (sha256 {})",
                manifest_path.display(),
                marker.manifest_sha256
            );
        }
        None => {
            let _ = writeln!(
                out,
                "Manifest: not updated (no category fetched successfully); previous manifest remains authoritative"
            );
        }
    }
    out
}

pub fn write(root: &Path, outcome: &SyncOutcome, manifest_path: &Path) -> Result<(), SyncError> {
    write_atomic(&root.join(STATUS_FILE), render(outcome, manifest_path).as_bytes())
}
