//! Retries, permanent failures, browser escalation and the circuit breaker

use crate::common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use sumi_ingest::{CircuitState, Config, Engine, UrlStatus};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_transient_timeout_then_success() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html_page("X", "<p>Late.</p>")))
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let config = Config {
        timeout_seconds: 1.0,
        ..test_config(&dir)
    };
    let seed = format!("{}/x", server.uri());
    let engine = Engine::builder(&seed, config)
        .ui(recorder.clone())
        .build()
        .unwrap();
    engine.run().await.unwrap();

    let paths = site_paths(&dir, &server);
    assert_eq!(file_names(&paths.content_dir()), vec!["index.md"]);

    let store = open_store(&paths).await;
    let record = row(&store, &seed).await;
    assert_eq!(record.status, UrlStatus::Completed);
    assert_eq!(record.retries, 1);
    assert_eq!(record.last_error, None);

    let errors = recorder.errors.lock().unwrap();
    assert_eq!(errors.as_slice(), &[(seed.clone(), "timeout".to_string())]);
}

#[tokio::test]
async fn test_server_error_fails_without_retry() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/y"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let seed = format!("{}/y", server.uri());
    let engine = Engine::new(&seed, test_config(&dir)).unwrap();
    let summary = engine.run().await.unwrap();
    assert_eq!(summary.count(UrlStatus::Failed), 1);

    let paths = site_paths(&dir, &server);
    assert!(file_names(&paths.content_dir()).is_empty());

    let store = open_store(&paths).await;
    let record = row(&store, &seed).await;
    assert_eq!(record.status, UrlStatus::Failed);
    assert_eq!(record.last_error.as_deref(), Some("Server Side Error (500)"));
    assert_eq!(record.retries, 0);
}

#[tokio::test]
async fn test_exhausted_retries_mark_failed() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let config = Config {
        max_retries: 2,
        ..test_config(&dir)
    };
    let seed = format!("{}/gone", server.uri());
    let engine = Engine::new(&seed, config).unwrap();
    engine.run().await.unwrap();

    let paths = site_paths(&dir, &server);
    let store = open_store(&paths).await;
    let record = row(&store, &seed).await;
    assert_eq!(record.status, UrlStatus::Failed);
    assert_eq!(record.retries, 2);
    assert_eq!(record.last_error.as_deref(), Some("HTTP 404"));

    let audit = sumi_ingest::output::read_audit_log(&paths.audit_log())
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0]["status"], "failed");
    assert_eq!(audit[0]["retries"], 2);
}

#[tokio::test]
async fn test_hostile_response_escalates_to_browser() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/z"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let browser = Arc::new(StubBrowser::new(html_page("Rendered", "<p>From the browser.</p>")));
    let seed = format!("{}/z", server.uri());
    let engine = Engine::builder(&seed, test_config(&dir))
        .ui(recorder.clone())
        .browser_fetcher(browser.clone())
        .build()
        .unwrap();
    let summary = engine.run().await.unwrap();

    assert!(engine.is_browser_mode());
    assert!(summary.browser_mode);
    assert_eq!(recorder.modes.lock().unwrap().as_slice(), &[true]);
    assert_eq!(browser.calls.load(Ordering::SeqCst), 1);

    let store = open_store(&site_paths(&dir, &server)).await;
    let record = row(&store, &seed).await;
    assert_eq!(record.status, UrlStatus::Completed);
    assert_eq!(record.retries, 0);

    let activity = recorder.activity.lock().unwrap();
    assert_eq!(activity[0].title, "Rendered");
}

#[tokio::test]
async fn test_circuit_opens_then_recovers() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let links: String = (1..=5)
        .map(|i| format!(r#"<a href="/err{}">e</a>"#, i))
        .chain(std::iter::once(r#"<a href="/ok">ok</a>"#.to_string()))
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html_page("Home", &links)))
        .mount(&server)
        .await;
    for i in 1..=5 {
        Mock::given(method("GET"))
            .and(path(format!("/err{}", i)))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html_page("Ok", "")))
        .expect(1)
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let config = Config {
        workers: 1,
        max_retries: 1,
        circuit_threshold: 5,
        circuit_timeout_seconds: 1.0,
        ..test_config(&dir)
    };
    let engine = Engine::builder(&format!("{}/", server.uri()), config)
        .ui(recorder.clone())
        .build()
        .unwrap();
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.count(UrlStatus::Failed), 5);
    assert_eq!(summary.count(UrlStatus::Completed), 2);
    assert_eq!(engine.circuit_state(), CircuitState::Closed);

    let circuits = recorder.circuits.lock().unwrap();
    assert!(circuits.iter().any(|s| s == "open"), "{:?}", circuits);
    assert_eq!(circuits.last().map(String::as_str), Some("closed"));
}
