//! Manifest persistence and integrity verification.
//!
//! The store owns two files under the cache root:
//!
//! ```text
//! {root}/
//! ├── manifest.json            # Manifest: every tracked record + summary
//! └── manifest.integrity.json  # IntegrityMarker: digest of manifest.json as written
//! ```
//!
//! The manifest is written first, the marker second. A missing marker or a
//! digest mismatch means the last run was torn between the two writes.

use crate::error::SyncError;
use crate::fsutil::write_atomic;
use crate::hash::digest_bytes;
use crate::types::{
    Category, IntegrityMarker, Manifest, RecordKey, ResourceRecord, MANIFEST_VERSION,
};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MARKER_FILE: &str = "manifest.integrity.json";

impl Manifest {
    pub fn new(repo: String, fetched_at: String, categories: Vec<Category>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            repo,
            fetched_at,
            categories,
            items: Vec::new(),
            summary: Default::default(),
        }
    }

    /// Records keyed by `(category, path)`.
    pub fn index(&self) -> HashMap<RecordKey, &ResourceRecord> {
        self.items.iter().map(|r| (r.key(), r)).collect()
    }

    /// Orders items by category, then path.
    pub fn sort_items(&mut self) {
        self.items
            .sort_by(|a, b| (a.category, &a.path).cmp(&(b.category, &b.path)));
    }

    /// Digest over the tracked content only.
    ///
    /// Unlike the digest in the integrity marker this ignores timestamps and
    /// summary counts, so two runs against an unchanged remote agree.
    pub fn fingerprint(&self) -> String {
        let mut items: Vec<&ResourceRecord> = self.items.iter().collect();
        items.sort_by(|a, b| (a.category, &a.path).cmp(&(b.category, &b.path)));

        let mut canonical = String::new();
        for r in items {
            let _ = writeln!(
                canonical,
                "{}\t{}\t{}\t{}\t{}",
                r.category, r.path, r.sha, r.hash, r.size
            );
        }
        digest_bytes(canonical.as_bytes())
    }
}

/// Result of checking `manifest.json` against its integrity marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Marker present and digest matches.
    Verified(IntegrityMarker),
    /// No manifest has been written yet.
    MissingManifest,
    /// The manifest exists without a marker.
    MissingMarker,
    /// The manifest on disk is not the one the marker describes.
    Mismatch { expected: String, actual: String },
}

/// Reads and writes the manifest and its integrity marker.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    manifest_path: PathBuf,
    marker_path: PathBuf,
}

impl ManifestStore {
    pub fn new(root: &Path) -> Self {
        Self {
            manifest_path: root.join(MANIFEST_FILE),
            marker_path: root.join(MARKER_FILE),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    /// Loads the prior manifest, treating a missing or corrupt file as absent.
    pub fn load(&self) -> Option<Manifest> {
        match self.try_load() {
            Ok(Some(manifest)) => {
                info!(
                    "Loaded prior manifest with {} records from {:?}",
                    manifest.items.len(),
                    self.manifest_path
                );
                Some(manifest)
            }
            Ok(None) => {
                info!("No prior manifest at {:?}", self.manifest_path);
                None
            }
            Err(e) => {
                warn!("Ignoring prior manifest: {}", e);
                None
            }
        }
    }

    /// Strict variant of [`ManifestStore::load`].
    pub fn try_load(&self) -> Result<Option<Manifest>, SyncError> {
        let content = match std::fs::read_to_string(&self.manifest_path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let manifest: Manifest =
            serde_json::from_str(&content).map_err(|e| SyncError::CorruptManifest {
                path: self.manifest_path.clone(),
                reason: e.to_string(),
            })?;

        if manifest.version > MANIFEST_VERSION {
            return Err(SyncError::CorruptManifest {
                path: self.manifest_path.clone(),
                reason: format!(
                    "unsupported version {} (newest known is {})",
                    manifest.version, MANIFEST_VERSION
                ),
            });
        }
        Ok(Some(manifest))
    }

    /// Persists `manifest`, then the marker describing exactly those bytes.
    pub fn save(
        &self,
        manifest: &Manifest,
        successful_categories: &[Category],
    ) -> Result<IntegrityMarker, SyncError> {
        let bytes = serde_json::to_vec_pretty(manifest)?;
        write_atomic(&self.manifest_path, &bytes)?;

        let marker = IntegrityMarker {
            fetched_at: manifest.fetched_at.clone(),
            successful_categories: successful_categories.to_vec(),
            summary: manifest.summary,
            manifest_sha256: digest_bytes(&bytes),
        };
        write_atomic(&self.marker_path, &serde_json::to_vec_pretty(&marker)?)?;

        info!(
            "Persisted manifest ({} records, sha256 {}) to {:?}",
            manifest.items.len(),
            marker.manifest_sha256,
            self.manifest_path
        );
        Ok(marker)
    }

    pub fn load_marker(&self) -> Result<Option<IntegrityMarker>, SyncError> {
        match std::fs::read(&self.marker_path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Checks that the marker describes the manifest currently on disk.
    pub fn verify(&self) -> Result<Verification, SyncError> {
        let bytes = match std::fs::read(&self.manifest_path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Verification::MissingManifest)
            }
            Err(e) => return Err(e.into()),
        };

        let Some(marker) = self.load_marker()? else {
            return Ok(Verification::MissingMarker);
        };

        let actual = digest_bytes(&bytes);
        if actual == marker.manifest_sha256 {
            Ok(Verification::Verified(marker))
        } else {
            Ok(Verification::Mismatch {
                expected: marker.manifest_sha256,
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Summary;
    use pretty_assertions::assert_eq;

    fn record(category: Category, path: &str, hash: &str) -> ResourceRecord {
        ResourceRecord {
            category,
            path: path.into(),
            sha: format!("sha-{}", path),
            size: 4,
            fetched_at: "2026-01-01T00:00:00Z".into(),
            hash: hash.into(),
        }
    }

    fn sample() -> Manifest {
        let mut manifest = Manifest::new(
            "github/awesome-copilot@main".into(),
            "2026-01-01T00:00:00Z".into(),
            vec![Category::Chatmodes, Category::Prompts],
        );
        manifest.items = vec![
            record(Category::Prompts, "b.prompt.md", "h2"),
            record(Category::Chatmodes, "a.chatmode.md", "h1"),
        ];
        manifest.summary = Summary {
            added: 2,
            ..Summary::default()
        };
        manifest
    }

    #[test]
    fn missing_manifest_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path());
        assert_eq!(store.load(), None);
        assert_eq!(store.verify().unwrap(), Verification::MissingManifest);
    }

    #[test]
    fn corrupt_manifest_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path());
        std::fs::write(store.manifest_path(), "{ not json").unwrap();

        assert!(matches!(
            store.try_load(),
            Err(SyncError::CorruptManifest { .. })
        ));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn future_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path());
        let mut manifest = sample();
        manifest.version = MANIFEST_VERSION + 1;
        std::fs::write(
            store.manifest_path(),
            serde_json::to_vec(&manifest).unwrap(),
        )
        .unwrap();

        assert_eq!(store.load(), None);
    }

    #[test]
    fn save_then_load_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path());
        let manifest = sample();

        let marker = store.save(&manifest, &[Category::Chatmodes]).unwrap();
        assert_eq!(marker.successful_categories, vec![Category::Chatmodes]);
        assert_eq!(marker.summary, manifest.summary);

        assert_eq!(store.load(), Some(manifest));
        assert_eq!(store.verify().unwrap(), Verification::Verified(marker));
    }

    #[test]
    fn manifest_uses_wire_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path());
        store.save(&sample(), &[Category::Prompts]).unwrap();

        let manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.manifest_path()).unwrap()).unwrap();
        assert_eq!(manifest["repo"], "github/awesome-copilot@main");
        assert_eq!(manifest["fetchedAt"], "2026-01-01T00:00:00Z");
        assert_eq!(manifest["summary"]["added"], 2);

        let marker: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.marker_path()).unwrap()).unwrap();
        assert_eq!(marker["successfulCategories"][0], "prompts");
        assert!(marker["manifestSha256"].is_string());
    }

    #[test]
    fn tampered_manifest_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path());
        store.save(&sample(), &[Category::Prompts]).unwrap();

        let mut edited = sample();
        edited.items.pop();
        std::fs::write(
            store.manifest_path(),
            serde_json::to_vec_pretty(&edited).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            store.verify().unwrap(),
            Verification::Mismatch { .. }
        ));
    }

    #[test]
    fn marker_absence_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path());
        store.save(&sample(), &[Category::Prompts]).unwrap();
        std::fs::remove_file(store.marker_path()).unwrap();

        assert_eq!(store.verify().unwrap(), Verification::MissingMarker);
    }

    #[test]
    fn fingerprint_ignores_order_and_timestamps() {
        let a = sample();
        let mut b = sample();
        b.items.reverse();
        b.fetched_at = "2027-01-01T00:00:00Z".into();
        b.summary = Summary {
            unchanged: 2,
            ..Summary::default()
        };
        for item in &mut b.items {
            item.fetched_at = "2027-01-01T00:00:00Z".into();
        }
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.items[0].hash = "different".into();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn sort_items_orders_by_category_then_path() {
        let mut manifest = sample();
        manifest.sort_items();
        let keys: Vec<_> = manifest.items.iter().map(|r| r.key()).collect();
        assert_eq!(
            keys,
            vec![
                (Category::Chatmodes, "a.chatmode.md".to_string()),
                (Category::Prompts, "b.prompt.md".to_string()),
            ]
        );
    }
}
