//! Interrupted crawls and resumption from the state database

use crate::common::*;
use std::sync::Arc;
use std::time::Duration;
use sumi_ingest::{Config, Engine, UrlKind, UrlStatus};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn twenty_page_site() -> MockServer {
    let server = MockServer::start().await;

    let links: String = (1..20)
        .map(|i| format!(r#"<a href="/p{}">page {}</a>"#, i, i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html_page("Home", &links)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/p\d+$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html_page("Leaf", "<p>Leaf page.</p>"))
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    server
}

fn config(dir: &TempDir) -> Config {
    Config {
        workers: 1,
        ..test_config(dir)
    }
}

#[tokio::test]
async fn test_shutdown_mid_run_then_resume() {
    let server = twenty_page_site().await;
    let dir = TempDir::new().unwrap();
    let seed = format!("{}/", server.uri());

    let recorder = Arc::new(Recorder::stop_after(3));
    let engine = Engine::builder(&seed, config(&dir))
        .ui(recorder.clone())
        .build()
        .unwrap();
    recorder.attach(engine.shutdown_handle());

    let summary = tokio::time::timeout(Duration::from_secs(30), engine.run())
        .await
        .expect("engine did not stop within its deadline")
        .unwrap();

    let completed = summary.count(UrlStatus::Completed);
    assert!(completed >= 3, "completed {}", completed);
    assert!(completed < 20);
    assert_eq!(summary.total(), 20);
    assert_eq!(summary.count(UrlStatus::Failed), 0);
    assert_eq!(completed + summary.count(UrlStatus::Pending), 20);

    let paths = site_paths(&dir, &server);
    let artifacts = file_names(&paths.content_dir())
        .into_iter()
        .filter(|name| name.ends_with(".md"))
        .count();
    assert_eq!(artifacts as i64, completed);

    // Restart: the remaining pages are picked up from the database
    let recorder = Arc::new(Recorder::default());
    let engine = Engine::builder(&seed, config(&dir))
        .ui(recorder.clone())
        .build()
        .unwrap();
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.total(), 20);
    assert_eq!(summary.count(UrlStatus::Completed), 20);
    assert_eq!(
        recorder.completed_urls().len() as i64,
        20 - completed,
        "pages completed before the restart were fetched again"
    );
    assert_eq!(file_names(&paths.content_dir()).len(), 20);

    let store = open_store(&paths).await;
    assert!(store
        .get_pending_urls(UrlKind::Page, 3)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_finished_crawl_restart_is_idle() {
    let server = twenty_page_site().await;
    let dir = TempDir::new().unwrap();
    let seed = format!("{}/", server.uri());

    Engine::new(&seed, config(&dir)).unwrap().run().await.unwrap();

    let recorder = Arc::new(Recorder::default());
    let engine = Engine::builder(&seed, config(&dir))
        .ui(recorder.clone())
        .build()
        .unwrap();
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.count(UrlStatus::Completed), 20);
    assert!(recorder.completed_urls().is_empty());
}

#[tokio::test]
async fn test_pause_blocks_progress_until_resume() {
    let server = twenty_page_site().await;
    let dir = TempDir::new().unwrap();

    let engine = Engine::new(&format!("{}/", server.uri()), config(&dir)).unwrap();
    engine.pause();
    assert!(engine.is_paused());

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run().await })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(engine.stats().pages_completed, 0);

    engine.resume();
    let summary = tokio::time::timeout(Duration::from_secs(30), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(summary.count(UrlStatus::Completed), 20);
}

#[tokio::test]
async fn test_shutdown_releases_in_flight_page() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html_page("Slow", "<p>Eventually.</p>"))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let seed = format!("{}/slow", server.uri());
    let engine = Engine::new(&seed, config(&dir)).unwrap();
    let handle = engine.shutdown_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.request_shutdown();
    });

    let started = std::time::Instant::now();
    let summary = tokio::time::timeout(Duration::from_secs(10), engine.run())
        .await
        .expect("engine did not stop after shutdown")
        .unwrap();
    assert!(
        started.elapsed() < Duration::from_millis(1500),
        "in-flight fetch was awaited instead of cancelled"
    );
    assert_eq!(summary.count(UrlStatus::Completed), 0);

    let paths = site_paths(&dir, &server);
    assert!(file_names(&paths.content_dir()).is_empty());
    {
        let store = open_store(&paths).await;
        let record = row(&store, &seed).await;
        assert_eq!(record.status, UrlStatus::Pending);
        assert_eq!(record.retries, 0);
        store.close();
    }

    let summary = Engine::new(&seed, config(&dir)).unwrap().run().await.unwrap();
    assert_eq!(summary.count(UrlStatus::Completed), 1);
    assert_eq!(file_names(&paths.content_dir()), vec!["index.md"]);
}
