//! Full crawl cycles: pages, assets, artifacts, audit log, robots.txt

use crate::common::*;
use std::sync::Arc;
use sumi_ingest::config::Compression;
use sumi_ingest::output::{read_artifact, read_audit_log};
use sumi_ingest::{Engine, UrlKind, UrlStatus};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_cold_start_two_page_site() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html_page(
            "Home",
            r#"<p>Welcome home.</p><a href="/a">A</a><img src="/img.png">"#,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(html_page("Page A", "<p>No links.</p>")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', b'N', b'G']))
        .expect(1)
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let seed = format!("{}/", server.uri());
    let engine = Engine::builder(&seed, test_config(&dir))
        .ui(recorder.clone())
        .build()
        .unwrap();
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.total(), 3);
    assert_eq!(summary.count(UrlStatus::Completed), 3);
    assert_eq!(summary.count_kind(UrlStatus::Completed, "asset"), 1);
    assert!(!summary.browser_mode);

    let paths = site_paths(&dir, &server);
    assert_eq!(file_names(&paths.content_dir()), vec!["a.md", "index.md"]);
    assert_eq!(
        std::fs::read(paths.images_dir().join("img.png")).unwrap(),
        vec![0x89, b'P', b'N', b'G']
    );

    let index = std::fs::read_to_string(paths.content_dir().join("index.md")).unwrap();
    assert!(index.starts_with("---\n"));
    assert!(index.contains("title: Home"));
    assert!(index.contains("Welcome home."));

    let audit = read_audit_log(&paths.audit_log()).await.unwrap();
    assert_eq!(audit.len(), 2);
    let home = audit.iter().find(|line| line["url"] == seed.as_str()).unwrap();
    assert_eq!(home["path"], "content/index.md");
    assert_eq!(home["assets"][0], format!("{}/img.png", server.uri()));

    assert_eq!(recorder.completed_urls().len(), 2);
    assert!(recorder.modes.lock().unwrap().is_empty());
    assert!(recorder.progress.load(std::sync::atomic::Ordering::SeqCst) > 0);

    let store = open_store(&paths).await;
    let asset = row(&store, &format!("{}/img.png", server.uri())).await;
    assert_eq!(asset.kind, Some(UrlKind::Asset));
    assert_eq!(asset.status, UrlStatus::Completed);
}

#[tokio::test]
async fn test_self_link_and_duplicates_do_not_loop() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html_page(
            "Loop",
            r##"<a href="/">self</a><a href="/#top">self again</a><a href="/b">b</a><a href="/b">b</a>"##,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(html_page("B", r#"<a href="/">home</a>"#)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = Engine::new(&format!("{}/", server.uri()), test_config(&dir)).unwrap();
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.total(), 2);
    assert_eq!(summary.count(UrlStatus::Completed), 2);
}

#[tokio::test]
async fn test_empty_page_gets_default_title() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/blank"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
        .mount(&server)
        .await;

    let engine = Engine::new(&format!("{}/blank", server.uri()), test_config(&dir)).unwrap();
    let summary = engine.run().await.unwrap();
    assert_eq!(summary.count(UrlStatus::Completed), 1);

    let paths = site_paths(&dir, &server);
    let artifact = std::fs::read_to_string(paths.content_dir().join("index.md")).unwrap();
    assert!(artifact.contains("title: Document"));
    assert!(artifact.ends_with("---\n\n"));
}

#[tokio::test]
async fn test_compressed_artifacts_read_back() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(html_page("Zipped", "<p>Packed body.</p>")),
        )
        .mount(&server)
        .await;

    let config = sumi_ingest::Config {
        compression: Compression::Zstd,
        ..test_config(&dir)
    };
    let engine = Engine::new(&format!("{}/", server.uri()), config).unwrap();
    engine.run().await.unwrap();

    let paths = site_paths(&dir, &server);
    assert_eq!(file_names(&paths.content_dir()), vec!["index.md.zst"]);

    let bytes = read_artifact(&paths.content_dir().join("index.md.zst"))
        .await
        .unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.starts_with("---\n"));
    assert!(text.contains("Packed body."));
}

#[tokio::test]
async fn test_robots_disallowed_page_fails_without_retry() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html_page(
            "Home",
            r#"<a href="/private/x">secret</a><a href="/open">open</a>"#,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/open"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html_page("Open", "")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/x"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = sumi_ingest::Config {
        respect_robots: true,
        ..test_config(&dir)
    };
    let engine = Engine::new(&format!("{}/", server.uri()), config).unwrap();
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.count(UrlStatus::Completed), 2);
    assert_eq!(summary.count(UrlStatus::Failed), 1);
    assert_eq!(
        summary.top_errors,
        vec![(sumi_ingest::crawler::ROBOTS_BLOCKED.to_string(), 1)]
    );

    let store = open_store(&site_paths(&dir, &server)).await;
    let blocked = row(&store, &format!("{}/private/x", server.uri())).await;
    assert_eq!(blocked.retries, 0);
}
