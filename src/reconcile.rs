//! The sync-and-reconcile engine.

use crate::backup::BackupSnapshotter;
use crate::context::RunContext;
use crate::error::SyncError;
use crate::fetch::ContentFetcher;
use crate::fsutil::{remove_if_present, safe_join, write_atomic};
use crate::hash::{digest_bytes, digest_file};
use crate::manifest::ManifestStore;
use crate::remote::RemoteClient;
use crate::status;
use crate::types::{
    BackupSnapshot, Category, Classification, Manifest, RecordKey, RemoteEntry, ResourceRecord,
    Summary, SyncConfig, SyncOutcome,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// State accumulated while walking the requested categories.
struct RunState<'p> {
    prior: HashMap<RecordKey, &'p ResourceRecord>,
    manifest: Manifest,
    summary: Summary,
    /// Every key the remote listed this run, fetched or not.
    observed: HashSet<RecordKey>,
    failed: Vec<Category>,
}

/// Drives listing, fetching, classification, removal and persistence.
///
/// # Example
///
/// ```no_run
/// use promptsync::{Reconciler, RunContext, SyncConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SyncConfig::default();
/// let mut ctx = RunContext::new(config.run_timeout);
/// let outcome = Reconciler::new(config)?.run(&mut ctx).await?;
/// println!("{:?}", outcome.summary);
/// # Ok(())
/// # }
/// ```
pub struct Reconciler {
    config: SyncConfig,
    remote: RemoteClient,
    fetcher: ContentFetcher,
    store: ManifestStore,
    backups: BackupSnapshotter,
}

impl Reconciler {
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        if config.categories.is_empty() {
            return Err(SyncError::Config(
                "at least one category must be requested".to_string(),
            ));
        }
        let remote = RemoteClient::new(&config)?;
        Ok(Self {
            fetcher: ContentFetcher::new(remote.clone()),
            store: ManifestStore::new(&config.root),
            backups: BackupSnapshotter::new(&config.root, config.backup_retention),
            remote,
            config,
        })
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    fn category_dir(&self, category: Category) -> PathBuf {
        self.config.root.join(category.as_str())
    }

    /// Runs one full sync.
    ///
    /// Only setup problems (creating the root, persisting the manifest) are
    /// returned as errors. Per-file and per-category failures are logged and
    /// reflected in the outcome.
    pub async fn run(&self, ctx: &mut RunContext) -> Result<SyncOutcome, SyncError> {
        if !self.config.dry_run {
            std::fs::create_dir_all(&self.config.root)?;
        }

        let prior = self.store.load();
        if let Some(prior) = &prior {
            if prior.repo != self.remote.repo_identifier() {
                warn!(
                    "Prior manifest tracks {} but this run mirrors {}",
                    prior.repo,
                    self.remote.repo_identifier()
                );
            }
        }

        let mut state = RunState {
            prior: prior.as_ref().map(Manifest::index).unwrap_or_default(),
            manifest: Manifest::new(
                self.remote.repo_identifier(),
                ctx.fetched_at.clone(),
                self.config.categories.clone(),
            ),
            summary: Summary::default(),
            observed: HashSet::new(),
            failed: Vec::new(),
        };

        for &category in &self.config.categories {
            if ctx.should_stop() {
                warn!("Skipping {}: run stopped early", category);
                state.failed.push(category);
                continue;
            }

            match self.remote.list(ctx, category).await {
                Ok(entries) => {
                    ctx.mark_successful(category);
                    info!("📦 {}: {} files listed", category, entries.len());
                    self.sync_category(ctx, category, entries, &mut state).await;
                }
                Err(e) => {
                    ctx.observe(&e);
                    if e.is_run_wide() {
                        warn!("⚠️  Listing {} stopped: {}", category, e);
                    } else {
                        error!("❌ Failed to list {}: {}", category, e);
                    }
                    state.failed.push(category);
                }
            }
        }

        if ctx.timed_out {
            error!(
                "Run exceeded its time budget after {}",
                humantime::format_duration(std::time::Duration::from_secs(
                    ctx.elapsed().as_secs()
                ))
            );
        }

        let removal_allowed = self.removal_allowed(ctx, prior.as_ref());
        let mut stale = Vec::new();
        if let Some(prior) = &prior {
            let built: HashSet<RecordKey> =
                state.manifest.items.iter().map(ResourceRecord::key).collect();

            for record in &prior.items {
                let key = record.key();
                if built.contains(&key) {
                    continue;
                }
                // Never infer absence from a category that was not observed.
                if removal_allowed
                    && ctx.is_successful(record.category)
                    && !state.observed.contains(&key)
                {
                    stale.push(record.clone());
                } else {
                    state.manifest.items.push(record.clone());
                }
            }
        }

        let backup = if stale.is_empty() {
            None
        } else {
            self.backup_before_removal(ctx)
        };

        let mut removed = Vec::new();
        for record in stale {
            match self.remove_record(&record) {
                Ok(()) => {
                    info!("🗑️  Removed {}/{}", record.category, record.path);
                    state.summary.record(Classification::Removed);
                    removed.push(record);
                }
                Err(e) => {
                    error!(
                        "Failed to remove {}/{}: {}; keeping record",
                        record.category, record.path, e
                    );
                    state.manifest.items.push(record);
                }
            }
        }

        state.manifest.sort_items();
        state.manifest.summary = state.summary;

        let marker = if self.config.dry_run {
            info!("Dry run: manifest not written");
            None
        } else if ctx.successful_categories.is_empty() {
            warn!("⚠️  No category fetched successfully; previous manifest remains authoritative");
            None
        } else {
            Some(
                self.store
                    .save(&state.manifest, &ctx.successful_categories)?,
            )
        };

        let outcome = SyncOutcome {
            summary: state.summary,
            manifest: state.manifest,
            successful_categories: ctx.successful_categories.clone(),
            failed_categories: state.failed,
            removed,
            rate_limited: ctx.rate_limited,
            timed_out: ctx.timed_out,
            dry_run: self.config.dry_run,
            marker,
            backup,
            elapsed: ctx.elapsed(),
        };

        if !self.config.dry_run {
            if let Err(e) = status::write(&self.config.root, &outcome, self.store.manifest_path())
            {
                warn!("Failed to write status file: {}", e);
            }
        }

        let s = &outcome.summary;
        info!(
            "✅ Sync finished: {} added, {} updated, {} removed, {} unchanged",
            s.added, s.updated, s.removed, s.unchanged
        );
        Ok(outcome)
    }

    /// Fetches, classifies and writes every listed entry of one category.
    async fn sync_category(
        &self,
        ctx: &mut RunContext,
        category: Category,
        entries: Vec<RemoteEntry>,
        state: &mut RunState<'_>,
    ) {
        let pb = self.progress_bar(category, entries.len());
        let category_dir = self.category_dir(category);

        for entry in entries {
            if ctx.should_stop() {
                warn!(
                    "Stopping {} early; remaining files keep their previous records",
                    category
                );
                break;
            }

            let relative = entry.relative_path(category).to_string();
            let key = (category, relative.clone());
            state.observed.insert(key.clone());
            pb.set_message(relative.clone());

            let destination = match safe_join(&category_dir, &relative) {
                Ok(path) => path,
                Err(e) => {
                    warn!("Skipping {}: {}", entry.path, e);
                    pb.inc(1);
                    continue;
                }
            };

            let bytes = match self.fetcher.fetch(ctx, &entry).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    ctx.observe(&e);
                    if e.is_run_wide() {
                        warn!("⚠️  Fetching {} stopped: {}", entry.path, e);
                    } else {
                        error!("❌ {}", e);
                    }
                    pb.inc(1);
                    continue;
                }
            };

            let hash = digest_bytes(&bytes);
            let prior = state.prior.get(&key).copied();
            let (classification, needs_write) = classify(prior, &hash, &destination).await;
            if let Some(prior) = prior {
                if prior.sha != entry.sha && classification == Classification::Unchanged {
                    debug!(
                        "{}: remote identifier changed ({} -> {}) without content change",
                        entry.path, prior.sha, entry.sha
                    );
                }
            }

            if needs_write && !self.config.dry_run {
                if let Err(e) = write_atomic(&destination, &bytes) {
                    error!("❌ Failed to write {:?}: {}", destination, e);
                    pb.inc(1);
                    continue;
                }
            }

            match classification {
                Classification::Added => info!("➕ Added {}/{}", category, relative),
                Classification::Updated => info!("🔄 Updated {}/{}", category, relative),
                _ => debug!("Unchanged {}/{}", category, relative),
            }

            state.summary.record(classification);
            state.manifest.items.push(ResourceRecord {
                category,
                path: relative,
                sha: entry.sha.clone(),
                size: bytes.len() as u64,
                fetched_at: ctx.fetched_at.clone(),
                hash,
            });
            pb.inc(1);
        }

        pb.finish_with_message(format!("✅ {} done", category));
    }

    fn removal_allowed(&self, ctx: &RunContext, prior: Option<&Manifest>) -> bool {
        let reason = if !self.config.allow_deletions {
            "deletions are disabled"
        } else if self.config.dry_run {
            "dry run"
        } else if prior.is_none() {
            "no prior manifest"
        } else if prior.is_some_and(|p| p.repo != self.remote.repo_identifier()) {
            "prior manifest tracks a different repository"
        } else if ctx.rate_limited {
            "remote rate limited this run; listing may be incomplete"
        } else if ctx.timed_out {
            "run exceeded its time budget"
        } else if ctx.successful_categories.is_empty() {
            "no category fetched successfully"
        } else {
            return true;
        };

        info!("Skipping removals: {}", reason);
        false
    }

    fn backup_before_removal(&self, ctx: &RunContext) -> Option<BackupSnapshot> {
        if self.config.backup_retention == 0 {
            debug!("Backups disabled");
            return None;
        }
        match self
            .backups
            .snapshot(&ctx.run_id, &ctx.successful_categories)
        {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("⚠️  {}; continuing with removals", e);
                None
            }
        }
    }

    fn remove_record(&self, record: &ResourceRecord) -> Result<(), SyncError> {
        let category_dir = self.category_dir(record.category);
        let path = safe_join(&category_dir, &record.path)?;
        remove_if_present(&path)?;
        prune_empty_parents(&path, &category_dir);
        Ok(())
    }

    fn progress_bar(&self, category: Category, len: usize) -> indicatif::ProgressBar {
        if !self.config.show_progress {
            return indicatif::ProgressBar::hidden();
        }
        let pb = indicatif::ProgressBar::new(len as u64);
        if let Ok(style) = indicatif::ProgressStyle::default_bar().template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {prefix} {msg} | {elapsed_precise}",
        ) {
            pb.set_style(style.progress_chars("█▓▒░ "));
        }
        pb.set_prefix(category.as_str());
        pb
    }
}

/// Classifies fetched content against the prior record and the destination.
///
/// The local digest is authoritative: a record is Unchanged only when the prior
/// digest matches and the destination still holds those bytes. Returns whether
/// the destination needs to be written.
async fn classify(
    prior: Option<&ResourceRecord>,
    hash: &str,
    destination: &Path,
) -> (Classification, bool) {
    let on_disk = match digest_file(destination).await {
        Ok(digest) => digest,
        Err(e) => {
            warn!("Cannot hash {:?}: {}", destination, e);
            None
        }
    };
    let disk_matches = on_disk.as_deref() == Some(hash);

    match prior {
        None => (Classification::Added, !disk_matches),
        Some(p) if p.hash == hash && disk_matches => (Classification::Unchanged, false),
        Some(_) => (Classification::Updated, !disk_matches),
    }
}

/// Removes now-empty directories between `path` and `stop`.
fn prune_empty_parents(path: &Path, stop: &Path) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        if std::fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}
