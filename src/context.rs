//! Per-run state threaded through every component call.

use crate::error::SyncError;
use crate::types::Category;
use std::future::Future;
use std::time::{Duration, Instant, SystemTime};

/// Explicit state of one sync run.
///
/// Components read the deadline from here and the reconciler records which
/// categories were observed and whether the remote throttled us.
#[derive(Debug, Clone)]
pub struct RunContext {
    started: Instant,
    budget: Option<Duration>,
    /// RFC 3339 timestamp stamped on every record and file written by this run
    pub fetched_at: String,
    /// Filesystem-safe identifier derived from `fetched_at`
    pub run_id: String,
    pub successful_categories: Vec<Category>,
    pub rate_limited: bool,
    pub timed_out: bool,
}

impl RunContext {
    pub fn new(budget: Option<Duration>) -> Self {
        Self::at(SystemTime::now(), budget)
    }

    /// Builds a context with a fixed wall-clock timestamp.
    pub fn at(now: SystemTime, budget: Option<Duration>) -> Self {
        let fetched_at = humantime::format_rfc3339_seconds(now).to_string();
        let run_id = fetched_at.replace(':', "-");
        Self {
            started: Instant::now(),
            budget,
            fetched_at,
            run_id,
            successful_categories: Vec::new(),
            rate_limited: false,
            timed_out: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the deadline, `None` when the run is unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.budget
            .map(|budget| budget.saturating_sub(self.started.elapsed()))
    }

    pub fn check_deadline(&self) -> Result<(), SyncError> {
        match (self.budget, self.remaining()) {
            (Some(budget), Some(left)) if left.is_zero() => Err(SyncError::Timeout { budget }),
            _ => Ok(()),
        }
    }

    /// Runs `fut`, aborting it once the run deadline passes.
    pub async fn bounded<T, F>(&self, fut: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, SyncError>>,
    {
        self.check_deadline()?;
        match (self.budget, self.remaining()) {
            (Some(budget), Some(left)) => tokio::time::timeout(left, fut)
                .await
                .map_err(|_| SyncError::Timeout { budget })?,
            _ => fut.await,
        }
    }

    pub fn mark_successful(&mut self, category: Category) {
        if !self.successful_categories.contains(&category) {
            self.successful_categories.push(category);
        }
    }

    pub fn is_successful(&self, category: Category) -> bool {
        self.successful_categories.contains(&category)
    }

    /// Records a run-wide signal carried by `err`, if any.
    pub fn observe(&mut self, err: &SyncError) {
        match err {
            SyncError::RateLimited { .. } => self.rate_limited = true,
            SyncError::Timeout { .. } => self.timed_out = true,
            _ => {}
        }
    }

    /// Whether no further remote work should be attempted.
    pub fn should_stop(&self) -> bool {
        self.rate_limited || self.timed_out
    }
}
