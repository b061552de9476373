#![allow(dead_code)]

use promptsync::{digest_bytes, Category, Reconciler, RunContext, SyncConfig, SyncOutcome};
use serde_json::json;
use std::path::Path;
use std::time::SystemTime;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REPO_PATH: &str = "/repos/github/awesome-copilot/contents";

/// A file served by the mock remote.
#[derive(Clone)]
pub struct RemoteFile {
    pub name: String,
    pub content: String,
    pub sha: String,
}

pub fn file(name: &str, content: &str) -> RemoteFile {
    RemoteFile {
        name: name.to_string(),
        content: content.to_string(),
        sha: format!("blob-{}", &digest_bytes(content.as_bytes())[..12]),
    }
}

impl RemoteFile {
    pub fn with_sha(mut self, sha: &str) -> Self {
        self.sha = sha.to_string();
        self
    }
}

pub fn listing_path(category: Category) -> String {
    format!("{}/{}", REPO_PATH, category)
}

pub fn raw_path(category: Category, name: &str) -> String {
    format!("/raw/{}/{}", category, name)
}

pub fn entry_json(server: &MockServer, category: Category, f: &RemoteFile) -> serde_json::Value {
    json!({
        "name": f.name,
        "path": format!("{}/{}", category, f.name),
        "sha": f.sha,
        "size": f.content.len(),
        "type": "file",
        "download_url": format!("{}{}", server.uri(), raw_path(category, &f.name)),
    })
}

/// Serves a category listing plus the raw content of every file in it.
pub async fn mount_category(server: &MockServer, category: Category, files: &[RemoteFile]) {
    mount_category_at(server, "main", category, files).await;
}

/// Like [`mount_category`], for the listing of `branch`.
pub async fn mount_category_at(
    server: &MockServer,
    branch: &str,
    category: Category,
    files: &[RemoteFile],
) {
    let entries: Vec<_> = files.iter().map(|f| entry_json(server, category, f)).collect();
    Mock::given(method("GET"))
        .and(path(listing_path(category)))
        .and(query_param("ref", branch))
        .respond_with(ResponseTemplate::new(200).set_body_json(entries))
        .mount(server)
        .await;

    for f in files {
        Mock::given(method("GET"))
            .and(path(raw_path(category, &f.name)))
            .respond_with(ResponseTemplate::new(200).set_body_string(f.content.clone()))
            .mount(server)
            .await;
    }
}

/// Makes the listing of `category` fail with `status`, expecting `calls` requests.
pub async fn mount_failing_category(server: &MockServer, category: Category, status: u16, calls: u64) {
    Mock::given(method("GET"))
        .and(path(listing_path(category)))
        .respond_with(ResponseTemplate::new(status))
        .expect(calls)
        .mount(server)
        .await;
}

/// Makes the listing of `category` fail with an exhausted quota.
pub async fn mount_rate_limited_category(server: &MockServer, category: Category) {
    Mock::given(method("GET"))
        .and(path(listing_path(category)))
        .respond_with(rate_limited())
        .expect(1)
        .mount(server)
        .await;
}

pub fn config(server: &MockServer, root: &Path, categories: &[Category]) -> SyncConfig {
    SyncConfig {
        api_base_url: server.uri(),
        root: root.to_path_buf(),
        categories: categories.to_vec(),
        backoff_factor_ms: 1,
        run_timeout: None,
        ..SyncConfig::default()
    }
}

pub async fn run(config: SyncConfig) -> SyncOutcome {
    let ctx = RunContext::new(config.run_timeout);
    run_with(config, ctx).await
}

/// Runs with a fixed wall-clock timestamp, so each run gets its own run id.
pub async fn run_at(config: SyncConfig, now: SystemTime) -> SyncOutcome {
    let ctx = RunContext::at(now, config.run_timeout);
    run_with(config, ctx).await
}

async fn run_with(config: SyncConfig, mut ctx: RunContext) -> SyncOutcome {
    Reconciler::new(config)
        .expect("valid config")
        .run(&mut ctx)
        .await
        .expect("sync completes")
}

pub fn read(root: &Path, category: Category, name: &str) -> String {
    std::fs::read_to_string(root.join(category.as_str()).join(name)).expect("file exists")
}

/// A 403 carrying an exhausted quota.
pub fn rate_limited() -> ResponseTemplate {
    ResponseTemplate::new(403)
        .insert_header("x-ratelimit-remaining", "0")
        .set_body_json(json!({"message": "API rate limit exceeded"}))
}

/// Serves only the listing of `category`; raw downloads are mounted by the caller.
pub async fn mount_listing(server: &MockServer, category: Category, files: &[RemoteFile]) {
    let entries: Vec<_> = files.iter().map(|f| entry_json(server, category, f)).collect();
    Mock::given(method("GET"))
        .and(path(listing_path(category)))
        .respond_with(ResponseTemplate::new(200).set_body_json(entries))
        .mount(server)
        .await;
}
