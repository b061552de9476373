//! Remote listing against the GitHub contents API.

use crate::context::RunContext;
use crate::error::SyncError;
use crate::retry::{with_retry, RetryPolicy};
use crate::types::{Category, RemoteEntry, SyncConfig};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use tracing::{debug, info};

/// File extensions mirrored from the remote.
const ACCEPTED_EXTENSIONS: [&str; 2] = ["md", "json"];

/// HTTP client for one remote repository.
///
/// Cloning is cheap; the underlying connection pool is shared.
#[derive(Clone, Debug)]
pub struct RemoteClient {
    http: Client,
    api_base: Url,
    repo: String,
    branch: String,
    token: Option<String>,
    policy: RetryPolicy,
}

impl RemoteClient {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let api_base = Url::parse(&config.api_base_url).map_err(|e| {
            SyncError::Config(format!("invalid API URL '{}': {}", config.api_base_url, e))
        })?;
        if api_base.cannot_be_a_base() {
            return Err(SyncError::Config(format!(
                "API URL '{}' cannot be used as a base",
                config.api_base_url
            )));
        }
        if config.repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(SyncError::Config(format!(
                "repository '{}' must be in owner/name form",
                config.repo
            )));
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("promptsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_base,
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            token: config.token.clone().filter(|t| !t.is_empty()),
            policy: RetryPolicy::from_config(config),
        })
    }

    /// Identifier recorded in the manifest, `owner/name@branch`.
    pub fn repo_identifier(&self) -> String {
        format!("{}@{}", self.repo, self.branch)
    }

    pub(crate) fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Contents API URL for a path inside the repository.
    pub(crate) fn contents_url(&self, path: &str) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("repos")
                .extend(self.repo.split('/'))
                .push("contents")
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url.query_pairs_mut().append_pair("ref", &self.branch);
        url
    }

    /// GET against the API, carrying the bearer credential when configured.
    pub(crate) fn api_get(&self, url: Url) -> RequestBuilder {
        let request = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Plain GET without credentials, for download locations on other hosts.
    pub(crate) fn raw_get(&self, url: &str) -> RequestBuilder {
        self.http.get(url)
    }

    /// Lists the mirrored files of one category.
    ///
    /// Transient failures are retried with backoff; a response signalling an
    /// exhausted quota fails immediately with [`SyncError::RateLimited`].
    pub async fn list(
        &self,
        ctx: &RunContext,
        category: Category,
    ) -> Result<Vec<RemoteEntry>, SyncError> {
        let url = self.contents_url(category.as_str());
        info!("Listing {} from {}", category, url);

        let entries = with_retry(ctx, self.policy, url.as_str(), || self.list_once(url.clone()))
            .await?;

        let total = entries.len();
        let kept: Vec<RemoteEntry> = entries.into_iter().filter(is_mirrored).collect();
        debug!(
            "Category {}: {} entries listed, {} mirrored",
            category,
            total,
            kept.len()
        );
        Ok(kept)
    }

    async fn list_once(&self, url: Url) -> Result<Vec<RemoteEntry>, SyncError> {
        let response = self.api_get(url.clone()).send().await?;
        let response = check_status(url.as_str(), response).await?;
        let body = response.text().await?;

        serde_json::from_str::<Vec<RemoteEntry>>(&body).map_err(|e| SyncError::Remote {
            url: url.to_string(),
            message: format!(
                "Invalid listing format: {}. Expected a JSON array of {{name, path, sha, size, type, download_url}}",
                e
            ),
        })
    }
}

/// Maps a non-success response onto the error taxonomy.
pub(crate) async fn check_status(url: &str, response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let quota_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");

    if quota_exhausted
        && matches!(status, StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS)
    {
        return Err(SyncError::RateLimited {
            url: url.to_string(),
        });
    }

    if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
        )
    {
        return Err(SyncError::Transient {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(SyncError::Remote {
        url: url.to_string(),
        message: format!("HTTP {} {}", status, snippet.trim()),
    })
}

/// Only plain files with an accepted extension are mirrored.
fn is_mirrored(entry: &RemoteEntry) -> bool {
    if entry.entry_type != "file" {
        return false;
    }
    std::path::Path::new(&entry.name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
}
