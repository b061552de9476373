//! Error types for sync operations.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during sync operations.
///
/// Only [`SyncError::RateLimited`] and [`SyncError::Timeout`] influence run-wide
/// decisions; every other variant stays scoped to the file or category that
/// produced it.
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// HTTP transport error.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    /// Remote failure worth retrying (server errors, throttling without an exhausted quota).
    #[error("Transient remote error from {url}: HTTP {status}")]
    Transient { url: String, status: u16 },

    /// Remote failure that retrying will not fix (404, malformed response, ...).
    #[error("Remote request to {url} failed: {message}")]
    Remote { url: String, message: String },

    /// The body ended before the announced length.
    #[error("Truncated response from {url}: expected {expected} bytes, got {actual}")]
    Truncated {
        url: String,
        expected: u64,
        actual: u64,
    },

    /// The remote refused the request because the quota is exhausted.
    #[error("Rate limited by remote at {url}")]
    RateLimited { url: String },

    /// A single file could not be retrieved.
    #[error("Failed to fetch {path}: {reason}")]
    Fetch { path: String, reason: String },

    /// The persisted manifest could not be parsed.
    #[error("Corrupt manifest at {path:?}: {reason}")]
    CorruptManifest { path: PathBuf, reason: String },

    /// The pre-deletion backup could not be created.
    #[error("Backup failed: {0}")]
    Backup(String),

    /// The run exceeded its time budget.
    #[error("Run exceeded its time budget of {}", humantime::format_duration(*budget))]
    Timeout { budget: Duration },

    /// A remote path would resolve outside of the destination tree.
    #[error("Refusing unsafe path {0:?}")]
    UnsafePath(String),

    /// Invalid invocation or configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether the bounded retry helper should try the operation again.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transient { .. } | SyncError::Truncated { .. } => true,
            SyncError::ReqwestError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Whether the error invalidates completeness assumptions for the whole run.
    pub fn is_run_wide(&self) -> bool {
        matches!(self, SyncError::RateLimited { .. } | SyncError::Timeout { .. })
    }
}
