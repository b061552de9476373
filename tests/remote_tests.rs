mod common;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use common::*;
use pretty_assertions::assert_eq;
use promptsync::{Category, ManifestStore, Summary};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHATMODES: Category = Category::Chatmodes;

#[tokio::test]
async fn empty_primary_download_falls_back_to_contents_api() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let f = file("a.md", "from the envelope");
    Mock::given(method("GET"))
        .and(path(listing_path(CHATMODES)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![entry_json(
            &server, CHATMODES, &f,
        )]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(raw_path(CHATMODES, "a.md")))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    // The API wraps base64 at 60 columns.
    let encoded = STANDARD.encode(f.content.as_bytes());
    let wrapped = format!("{}\n{}\n", &encoded[..8], &encoded[8..]);
    Mock::given(method("GET"))
        .and(path(format!("{}/chatmodes/a.md", REPO_PATH)))
        .and(query_param("ref", "main"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"content": wrapped, "encoding": "base64"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let outcome = run(config(&server, root.path(), &[CHATMODES])).await;

    assert_eq!(outcome.summary.added, 1);
    assert_eq!(read(root.path(), CHATMODES, "a.md"), "from the envelope");
}

#[tokio::test]
async fn unfetchable_file_keeps_its_previous_record() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let files = [file("a.md", "alpha"), file("b.md", "beta")];
    mount_category(&server, CHATMODES, &files).await;
    let first = run(config(&server, root.path(), &[CHATMODES])).await;

    // b.md is still listed but neither download path serves it.
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(listing_path(CHATMODES)))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            files
                .iter()
                .map(|f| entry_json(&server, CHATMODES, f))
                .collect::<Vec<_>>(),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(raw_path(CHATMODES, "a.md")))
        .respond_with(ResponseTemplate::new(200).set_body_string("alpha"))
        .mount(&server)
        .await;

    let outcome = run(config(&server, root.path(), &[CHATMODES])).await;

    assert_eq!(
        outcome.summary,
        Summary {
            unchanged: 1,
            ..Summary::default()
        }
    );
    assert!(outcome.removed.is_empty());
    assert!(root.path().join("chatmodes/b.md").exists());

    let manifest = ManifestStore::new(root.path()).load().unwrap();
    assert_eq!(manifest.items.len(), 2);
    assert_eq!(manifest.items[1], first.manifest.items[1]);
}

#[tokio::test]
async fn transient_listing_failures_are_retried() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path(listing_path(CHATMODES)))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_category(&server, CHATMODES, &[file("a.md", "alpha")]).await;

    let outcome = run(config(&server, root.path(), &[CHATMODES])).await;

    assert_eq!(outcome.successful_categories, vec![CHATMODES]);
    assert_eq!(outcome.summary.added, 1);
}

#[tokio::test]
async fn only_markdown_and_json_files_are_mirrored() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let category = Category::Collections;
    let kept = [file("a.collection.json", "{}"), file("README.md", "# readme")];
    let mut entries: Vec<_> = kept.iter().map(|f| entry_json(&server, category, f)).collect();
    entries.push(json!({
        "name": "nested", "path": "collections/nested", "sha": "d1",
        "size": 0, "type": "dir", "download_url": null,
    }));
    entries.push(json!({
        "name": "logo.png", "path": "collections/logo.png", "sha": "p1",
        "size": 4, "type": "file",
        "download_url": format!("{}/raw/collections/logo.png", server.uri()),
    }));
    Mock::given(method("GET"))
        .and(path(listing_path(category)))
        .respond_with(ResponseTemplate::new(200).set_body_json(entries))
        .mount(&server)
        .await;
    for f in &kept {
        Mock::given(method("GET"))
            .and(path(raw_path(category, &f.name)))
            .respond_with(ResponseTemplate::new(200).set_body_string(f.content.clone()))
            .mount(&server)
            .await;
    }

    let outcome = run(config(&server, root.path(), &[category])).await;

    let paths: Vec<_> = outcome.manifest.items.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["README.md", "a.collection.json"]);
    assert!(!root.path().join("collections/logo.png").exists());
}

#[tokio::test]
async fn token_is_sent_to_the_api_only() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let f = file("a.md", "alpha");
    Mock::given(method("GET"))
        .and(path(listing_path(CHATMODES)))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![entry_json(
            &server, CHATMODES, &f,
        )]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(raw_path(CHATMODES, "a.md")))
        .respond_with(ResponseTemplate::new(200).set_body_string("alpha"))
        .mount(&server)
        .await;

    let mut cfg = config(&server, root.path(), &[CHATMODES]);
    cfg.token = Some("s3cret".to_string());
    let outcome = run(cfg).await;
    assert_eq!(outcome.summary.added, 1);

    let requests = server.received_requests().await.unwrap();
    let raw = requests
        .iter()
        .find(|r| r.url.path() == raw_path(CHATMODES, "a.md"))
        .unwrap();
    assert!(raw.headers.get("authorization").is_none());
}
