use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use promptsync::{
    combine, normalize, publish, Category, LinkStrategy, ManifestStore, Reconciler, RunContext,
    SyncConfig, Verification,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "promptsync")]
#[command(about = "Mirror curated Copilot resources from GitHub into a local cache", long_about = None)]
#[command(version)]
struct Cli {
    /// Local cache root (one directory per category plus manifest.json)
    #[arg(long, global = true, default_value = ".promptsync")]
    root: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the remote categories and reconcile them with the cache
    Sync(SyncArgs),
    /// Merge category directories into one flat collection
    Combine {
        /// Categories to merge, in priority order (comma-separated; default: all)
        #[arg(short, long, value_delimiter = ',')]
        categories: Vec<Category>,

        /// Output directory (default: <root>/combined)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Link the combined collection into one or more profile directories
    Publish {
        /// Profile directories to publish into
        #[arg(required = true)]
        profiles: Vec<PathBuf>,

        /// Collection to publish (default: <root>/combined)
        #[arg(long)]
        collection: Option<PathBuf>,

        /// Always copy instead of trying links first
        #[arg(long)]
        copy: bool,
    },
    /// Move resources filed under the wrong category by filename suffix
    Normalize {
        /// Categories to inspect (comma-separated; default: all)
        #[arg(short, long, value_delimiter = ',')]
        categories: Vec<Category>,
    },
    /// Check manifest.json against its integrity marker
    Verify,
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Categories to sync (comma-separated; default: all)
    #[arg(short, long, value_delimiter = ',')]
    categories: Vec<Category>,

    /// Source repository in owner/name form
    #[arg(long, default_value = "github/awesome-copilot")]
    repo: String,

    /// Branch or ref to mirror
    #[arg(long, default_value = "main")]
    branch: String,

    /// Remote API base URL
    #[arg(long, default_value = "https://api.github.com")]
    api_url: String,

    /// Bearer token; raises the request quota
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Classify only; write nothing
    #[arg(long)]
    dry_run: bool,

    /// Never delete files that disappeared remotely
    #[arg(long)]
    no_delete: bool,

    /// Number of pre-deletion backups to keep (0 disables backups)
    #[arg(long, default_value_t = 5)]
    backup_retention: usize,

    /// Attempts per remote request, including the first
    #[arg(long, default_value_t = 3)]
    max_attempts: usize,

    /// Time budget for the whole run (e.g. "10m")
    #[arg(long, default_value = "10m", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Timeout for a single HTTP request (e.g. "30s")
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    request_timeout: Duration,
}

fn categories_or_all(categories: Vec<Category>) -> Vec<Category> {
    if categories.is_empty() {
        Category::ALL.to_vec()
    } else {
        categories
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("promptsync={}", log_level))
        .init();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the command completed but should exit non-zero.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Command::Sync(args) => sync(cli.root, args).await,
        Command::Combine { categories, output } => {
            let output = output.unwrap_or_else(|| cli.root.join("combined"));
            let report = combine(&cli.root, &categories_or_all(categories), &output)
                .with_context(|| format!("combining into {:?}", output))?;
            if !report.conflicts.is_empty() {
                warn!(
                    "{} name conflicts during combine: {:?}",
                    report.conflicts.len(),
                    report.conflicts
                );
            }
            Ok(true)
        }
        Command::Publish {
            profiles,
            collection,
            copy,
        } => {
            let collection = collection.unwrap_or_else(|| cli.root.join("combined"));
            let strategies: &[LinkStrategy] = if copy {
                &[LinkStrategy::Copy]
            } else {
                &LinkStrategy::DEFAULT_ORDER
            };
            let report = publish(&collection, &profiles, strategies)?;
            Ok(report.failed == 0)
        }
        Command::Normalize { categories } => {
            let report = normalize(&cli.root, &categories_or_all(categories))?;
            info!(
                "Normalized {:?}: {} moved, {} duplicates dropped, {} conflicts",
                cli.root,
                report.moved.len(),
                report.dropped_duplicates,
                report.conflicts.len()
            );
            Ok(true)
        }
        Command::Verify => {
            let store = ManifestStore::new(&cli.root);
            match store.verify()? {
                Verification::Verified(marker) => {
                    info!(
                        "✅ Manifest verified (fetched {}, categories {:?})",
                        marker.fetched_at, marker.successful_categories
                    );
                    Ok(true)
                }
                Verification::MissingManifest => {
                    warn!("No manifest at {:?}", store.manifest_path());
                    Ok(false)
                }
                Verification::MissingMarker => {
                    error!("❌ Manifest has no integrity marker; last run was interrupted");
                    Ok(false)
                }
                Verification::Mismatch { expected, actual } => {
                    error!(
                        "❌ Manifest digest mismatch: marker {}, on disk {}",
                        expected, actual
                    );
                    Ok(false)
                }
            }
        }
    }
}

async fn sync(root: PathBuf, args: SyncArgs) -> anyhow::Result<bool> {
    let config = SyncConfig {
        api_base_url: args.api_url,
        repo: args.repo,
        branch: args.branch,
        token: args.token,
        root,
        categories: categories_or_all(args.categories),
        allow_deletions: !args.no_delete,
        dry_run: args.dry_run,
        backup_retention: args.backup_retention,
        max_attempts: args.max_attempts,
        request_timeout: args.request_timeout,
        run_timeout: Some(args.timeout),
        show_progress: atty::is(atty::Stream::Stderr),
        ..SyncConfig::default()
    };

    info!("🚀 PromptSync");
    info!("Repository: {}@{}", config.repo, config.branch);
    info!("Categories: {:?}", config.categories);
    info!("Cache root: {:?}", config.root);
    if config.token.is_none() {
        info!("No token configured; using the unauthenticated request quota");
    }

    let mut ctx = RunContext::new(config.run_timeout);
    let reconciler = Reconciler::new(config).context("invalid sync configuration")?;
    let outcome = reconciler
        .run(&mut ctx)
        .await
        .context("sync could not complete")?;

    if outcome.timed_out {
        error!("❌ Sync aborted: time budget exhausted");
        return Ok(false);
    }
    Ok(true)
}
