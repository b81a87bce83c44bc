//! Shared fixtures: test config, recording observer, stub browser

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use sumi_ingest::crawler::{FetchError, FetchOutcome, FetchedPage, PageFetcher};
use sumi_ingest::output::SitePaths;
use sumi_ingest::storage::UrlRecord;
use sumi_ingest::ui::{ActivityEntry, EngineStats, UiCallback};
use sumi_ingest::{Config, ShutdownHandle, StateStore};
use tempfile::TempDir;
use wiremock::MockServer;

/// Fast, quiet settings for a crawl rooted in `dir`
pub fn test_config(dir: &TempDir) -> Config {
    Config {
        data_dir: dir.path().to_path_buf(),
        workers: 2,
        asset_workers: 1,
        request_delay: 0.0,
        timeout_seconds: 5.0,
        respect_robots: false,
        min_shutdown_seconds: 2.0,
        ..Config::default()
    }
}

pub fn html_page(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{}</title></head><body><h1>{}</h1>{}</body></html>",
        title, title, body
    )
}

pub fn site_paths(dir: &TempDir, server: &MockServer) -> SitePaths {
    let seed = url::Url::parse(&server.uri()).unwrap();
    SitePaths::new(dir.path(), &seed)
}

/// Reopens a finished crawl's database for inspection
pub async fn open_store(paths: &SitePaths) -> StateStore {
    let store = StateStore::open(&paths.state_db(), 1, Duration::from_secs(5), Duration::ZERO)
        .unwrap();
    store.initialize().await.unwrap();
    store
}

pub async fn row(store: &StateStore, url: &str) -> UrlRecord {
    store
        .get_url(url)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("no row for {}", url))
}

/// Files directly under `dir`, sorted by name
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Observer that records every notification
///
/// With `stop_after(n)` it requests shutdown once `n` pages completed.
#[derive(Default)]
pub struct Recorder {
    pub progress: AtomicUsize,
    pub activity: Mutex<Vec<ActivityEntry>>,
    pub modes: Mutex<Vec<bool>>,
    pub circuits: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<(String, String)>>,
    stop_after: Option<usize>,
    shutdown: OnceLock<ShutdownHandle>,
}

impl Recorder {
    pub fn stop_after(pages: usize) -> Self {
        Self {
            stop_after: Some(pages),
            ..Self::default()
        }
    }

    pub fn attach(&self, handle: ShutdownHandle) {
        let _ = self.shutdown.set(handle);
    }

    pub fn completed_urls(&self) -> Vec<String> {
        self.activity
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.url.clone())
            .collect()
    }
}

impl UiCallback for Recorder {
    fn on_progress(&self, _stats: &EngineStats) {
        self.progress.fetch_add(1, Ordering::SeqCst);
    }

    fn on_activity(&self, entry: &ActivityEntry) {
        let count = {
            let mut activity = self.activity.lock().unwrap();
            activity.push(entry.clone());
            activity.len()
        };
        if self.stop_after.is_some_and(|limit| count >= limit) {
            if let Some(handle) = self.shutdown.get() {
                handle.request_shutdown();
            }
        }
    }

    fn on_mode_change(&self, browser_mode: bool) {
        self.modes.lock().unwrap().push(browser_mode);
    }

    fn on_circuit_change(&self, state: &str) {
        self.circuits.lock().unwrap().push(state.to_string());
    }

    fn on_error(&self, url: &str, error_kind: &str, _message: &str) {
        self.errors
            .lock()
            .unwrap()
            .push((url.to_string(), error_kind.to_string()));
    }
}

/// Browser strategy returning a fixed page for every URL
pub struct StubBrowser {
    html: String,
    pub calls: AtomicUsize,
}

impl StubBrowser {
    pub fn new(html: String) -> Self {
        Self {
            html,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PageFetcher for StubBrowser {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchOutcome::Page(FetchedPage {
            url: url.to_string(),
            status: 200,
            body: self.html.clone().into_bytes(),
        }))
    }

    fn name(&self) -> &'static str {
        "stub-browser"
    }
}
