//! File content retrieval with a contents-API fallback.

use crate::context::RunContext;
use crate::error::SyncError;
use crate::remote::{check_status, RemoteClient};
use crate::retry::with_retry;
use crate::types::RemoteEntry;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};

/// Contents API response for a single file.
#[derive(Deserialize, Debug)]
struct ContentEnvelope {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

/// Retrieves raw bytes for listed entries.
#[derive(Clone, Debug)]
pub struct ContentFetcher {
    remote: RemoteClient,
}

impl ContentFetcher {
    pub fn new(remote: RemoteClient) -> Self {
        Self { remote }
    }

    /// Downloads the bytes of one file.
    ///
    /// The entry's `download_url` is tried first. An empty or failed primary
    /// download falls back to the base64 envelope from the contents API. Both
    /// paths use the bounded retry policy. Run-wide errors (rate limit, deadline)
    /// are returned as-is; everything else becomes [`SyncError::Fetch`].
    pub async fn fetch(&self, ctx: &RunContext, entry: &RemoteEntry) -> Result<Vec<u8>, SyncError> {
        let policy = self.remote.policy();

        if let Some(url) = entry.download_url.as_deref() {
            match with_retry(ctx, policy, url, || self.download_raw(url)).await {
                Ok(bytes) if !bytes.is_empty() => return Ok(bytes),
                Ok(_) => warn!(
                    "Empty body for {} from {}, falling back to contents API",
                    entry.path, url
                ),
                Err(e) if e.is_run_wide() => return Err(e),
                Err(e) => warn!(
                    "Primary download of {} failed ({}), falling back to contents API",
                    entry.path, e
                ),
            }
        }

        let bytes = with_retry(ctx, policy, &entry.path, || self.download_envelope(entry))
            .await
            .map_err(|e| {
                if e.is_run_wide() {
                    e
                } else {
                    SyncError::Fetch {
                        path: entry.path.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        if bytes.is_empty() {
            return Err(SyncError::Fetch {
                path: entry.path.clone(),
                reason: "both download paths returned empty content".to_string(),
            });
        }
        Ok(bytes)
    }

    async fn download_raw(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        let response = self.remote.raw_get(url).send().await?;
        let response = check_status(url, response).await?;
        let content_length = response.content_length();

        let mut bytes = Vec::with_capacity(content_length.unwrap_or(0) as usize);
        let mut byte_stream = response.bytes_stream();
        while let Some(piece) = byte_stream.next().await {
            bytes.extend_from_slice(&piece?);
        }

        if let Some(expected) = content_length {
            if bytes.len() as u64 != expected {
                return Err(SyncError::Truncated {
                    url: url.to_string(),
                    expected,
                    actual: bytes.len() as u64,
                });
            }
        }
        Ok(bytes)
    }

    async fn download_envelope(&self, entry: &RemoteEntry) -> Result<Vec<u8>, SyncError> {
        let url = self.remote.contents_url(&entry.path);
        debug!("Fetching {} through {}", entry.path, url);

        let response = self.remote.api_get(url.clone()).send().await?;
        let response = check_status(url.as_str(), response).await?;
        let body = response.text().await?;

        let envelope: ContentEnvelope =
            serde_json::from_str(&body).map_err(|e| SyncError::Remote {
                url: url.to_string(),
                message: format!("Invalid content envelope: {}", e),
            })?;
        decode_envelope(url.as_str(), &envelope)
    }
}

fn decode_envelope(url: &str, envelope: &ContentEnvelope) -> Result<Vec<u8>, SyncError> {
    if !envelope.encoding.eq_ignore_ascii_case("base64") {
        return Err(SyncError::Remote {
            url: url.to_string(),
            message: format!("Unsupported content encoding '{}'", envelope.encoding),
        });
    }

    let compact: String = envelope
        .content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD.decode(compact).map_err(|e| SyncError::Remote {
        url: url.to_string(),
        message: format!("Invalid base64 content: {}", e),
    })
}
