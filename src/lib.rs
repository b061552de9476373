//! PromptSync - Incremental, hash-verified mirror of curated Copilot resources
//!
//! This library mirrors the `chatmodes`, `instructions`, `prompts` and
//! `collections` directories of a GitHub repository into a local cache, keeps a
//! durable manifest of what was fetched, and publishes the result into consumer
//! profile directories.
//!
//! # Features
//!
//! - **Incremental Sync**: Files are classified as added, updated, unchanged or removed
//!   against the previous manifest using SHA-256 digests
//! - **Safe Deletion**: Nothing is deleted unless its category was listed completely
//!   and the remote did not rate-limit the run
//! - **Integrity Marker**: Every persisted manifest is accompanied by its digest
//! - **Pre-deletion Backups**: Category directories are archived before removals
//! - **Automatic Retry**: Bounded exponential backoff for transient failures
//!
//! # Example
//!
//! ```no_run
//! use promptsync::{Category, Reconciler, RunContext, SyncConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig {
//!     categories: vec![Category::Prompts, Category::Chatmodes],
//!     ..SyncConfig::default()
//! };
//! let mut ctx = RunContext::new(config.run_timeout);
//! let outcome = Reconciler::new(config)?.run(&mut ctx).await?;
//! println!("added {}", outcome.summary.added);
//! # Ok(())
//! # }
//! ```

mod backup;
mod combine;
mod context;
mod error;
mod fetch;
mod fsutil;
mod hash;
mod links;
mod manifest;
mod normalize;
mod publish;
mod reconcile;
mod remote;
mod retry;
mod status;
mod types;

pub use backup::BackupSnapshotter;
pub use combine::{combine, CombineReport};
pub use context::RunContext;
pub use error::SyncError;
pub use fetch::ContentFetcher;
pub use hash::{digest_bytes, digest_file};
pub use links::{link_or_copy, LinkStrategy};
pub use manifest::{ManifestStore, Verification, MANIFEST_FILE, MARKER_FILE};
pub use normalize::{normalize, NormalizeReport};
pub use publish::{publish, PublishReport};
pub use reconcile::Reconciler;
pub use remote::RemoteClient;
pub use retry::{with_retry, RetryPolicy};
pub use status::STATUS_FILE;
pub use types::{
    BackupSnapshot, Category, Classification, IntegrityMarker, Manifest, RemoteEntry,
    ResourceRecord, Summary, SyncConfig, SyncOutcome,
};
