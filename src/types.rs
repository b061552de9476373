//! Data structures for sync operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Current `manifest.json` schema version.
pub const MANIFEST_VERSION: u32 = 1;

/// A named grouping of resources, mapped to both a remote and a local directory.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Chatmodes,
    Instructions,
    Prompts,
    Collections,
}

impl Category {
    /// Every category, in canonical processing order.
    pub const ALL: [Category; 4] = [
        Category::Chatmodes,
        Category::Instructions,
        Category::Prompts,
        Category::Collections,
    ];

    /// Directory name, both remotely and under the local root.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Chatmodes => "chatmodes",
            Category::Instructions => "instructions",
            Category::Prompts => "prompts",
            Category::Collections => "collections",
        }
    }

    /// Filename suffix that marks a resource as belonging to this category.
    pub fn suffix(&self) -> &'static str {
        match self {
            Category::Chatmodes => ".chatmode.md",
            Category::Instructions => ".instructions.md",
            Category::Prompts => ".prompt.md",
            Category::Collections => ".collection.json",
        }
    }

    /// Category whose suffix the file name carries, if any.
    pub fn from_suffix(file_name: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| file_name.ends_with(c.suffix()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chatmodes" => Ok(Category::Chatmodes),
            "instructions" => Ok(Category::Instructions),
            "prompts" => Ok(Category::Prompts),
            "collections" => Ok(Category::Collections),
            other => Err(format!(
                "unknown category '{}' (expected one of: chatmodes, instructions, prompts, collections)",
                other
            )),
        }
    }
}

/// Configuration for a sync run.
///
/// # Example
///
/// ```
/// use promptsync::{Category, SyncConfig};
///
/// let config = SyncConfig {
///     categories: vec![Category::Prompts],
///     dry_run: true,
///     ..SyncConfig::default()
/// };
/// assert_eq!(config.repo, "github/awesome-copilot");
/// ```
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote API (e.g., `https://api.github.com`)
    pub api_base_url: String,
    /// Repository in `owner/name` form
    pub repo: String,
    /// Branch or ref to mirror
    pub branch: String,
    /// Optional bearer credential; raises the per-request quota
    pub token: Option<String>,
    /// Local cache root holding one directory per category plus the manifest
    pub root: PathBuf,
    /// Categories requested for this run
    pub categories: Vec<Category>,
    /// Whether files that vanished remotely may be deleted locally
    pub allow_deletions: bool,
    /// Classify only; write nothing
    pub dry_run: bool,
    /// Number of backup archives to keep (0 disables backups)
    pub backup_retention: usize,
    /// Maximum attempts per remote operation, including the first
    pub max_attempts: usize,
    /// Multiplier applied to the `2^attempt` backoff, in milliseconds (1000 = seconds).
    pub backoff_factor_ms: u64,
    /// Timeout applied to every single HTTP request
    pub request_timeout: Duration,
    /// Budget for the whole run; `None` runs unbounded
    pub run_timeout: Option<Duration>,
    /// Draw a progress bar while fetching
    pub show_progress: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            repo: "github/awesome-copilot".to_string(),
            branch: "main".to_string(),
            token: None,
            root: PathBuf::from(".promptsync"),
            categories: Category::ALL.to_vec(),
            allow_deletions: true,
            dry_run: false,
            backup_retention: 5,
            max_attempts: 3,
            backoff_factor_ms: 1000,
            request_timeout: Duration::from_secs(30),
            run_timeout: Some(Duration::from_secs(600)),
            show_progress: false,
        }
    }
}

/// One entry of a remote directory listing.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    /// Path from the repository root, e.g. `prompts/review.prompt.md`
    pub path: String,
    /// Remote-assigned content identifier (git blob sha)
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl RemoteEntry {
    /// Path relative to the category directory.
    pub fn relative_path(&self, category: Category) -> &str {
        let prefix = category.as_str();
        self.path
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(&self.path)
    }
}

/// One tracked remote file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub category: Category,
    /// Path relative to the category directory; unique within the category
    pub path: String,
    /// Remote content identifier
    pub sha: String,
    pub size: u64,
    /// RFC 3339 timestamp of the fetch that produced this record
    #[serde(rename = "lastFetched")]
    pub fetched_at: String,
    /// SHA-256 of the downloaded bytes
    pub hash: String,
}

/// Unique key of a record within a manifest.
pub type RecordKey = (Category, String);

impl ResourceRecord {
    pub fn key(&self) -> RecordKey {
        (self.category, self.path.clone())
    }
}

/// Per-run outcome counters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl Summary {
    pub fn record(&mut self, classification: Classification) {
        match classification {
            Classification::Added => self.added += 1,
            Classification::Updated => self.updated += 1,
            Classification::Removed => self.removed += 1,
            Classification::Unchanged => self.unchanged += 1,
        }
    }
}

/// How a file compares against the prior manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Added,
    Updated,
    Unchanged,
    Removed,
}

/// The durable snapshot written to `manifest.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: u32,
    /// Repository identifier, `owner/name@branch`
    pub repo: String,
    pub fetched_at: String,
    pub categories: Vec<Category>,
    pub items: Vec<ResourceRecord>,
    pub summary: Summary,
}

/// Companion record proving a manifest was written by a completed run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityMarker {
    pub fetched_at: String,
    pub successful_categories: Vec<Category>,
    pub summary: Summary,
    pub manifest_sha256: String,
}

/// Archive of at-risk files taken before deletions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSnapshot {
    pub run_id: String,
    pub categories: Vec<Category>,
    pub archive: PathBuf,
}

/// Everything a finished run reports back to its caller.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// The manifest built by this run (persisted only when `marker` is set)
    pub manifest: Manifest,
    pub summary: Summary,
    pub successful_categories: Vec<Category>,
    pub failed_categories: Vec<Category>,
    /// Records deleted during this run
    pub removed: Vec<ResourceRecord>,
    pub rate_limited: bool,
    pub timed_out: bool,
    pub dry_run: bool,
    pub marker: Option<IntegrityMarker>,
    pub backup: Option<BackupSnapshot>,
    pub elapsed: Duration,
}
