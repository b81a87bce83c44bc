//! Crawl engine - orchestration of the page and asset worker pools
//!
//! The engine owns the whole life of a crawl:
//! - Loading prior state from the site's database and seeding if it is empty
//! - Running page workers (fetch, extract, write, discover) and asset workers
//! - Guarding the site with a circuit breaker and escalating to the browser
//!   strategy when the site turns hostile
//! - Supervising progress and shutting down gracefully or immediately
//! - Producing the final summary

use crate::config::{validate, Config};
use crate::crawler::browser::BrowserFetcher;
use crate::crawler::captcha::detect_captcha;
use crate::crawler::discovery::{discover_links, DiscoveredLinks, LinkClassifier};
use crate::crawler::fetcher::{AssetClient, FetchError, FetchOutcome, PageFetcher, StealthFetcher};
use crate::crawler::queue::{QueueItem, WorkQueue};
use crate::extract::{pre_clean, Extractors};
use crate::output::{
    enhance_markdown, generate_summary, ArtifactWriter, AuditLog, AuditRecord, SitePaths, Summary,
};
use crate::robots::RobotsCache;
use crate::state::{CircuitBreaker, CircuitState, UrlKind, UrlStatus};
use crate::storage::StateStore;
use crate::ui::{ActivityEntry, EngineState, EngineStats, TracingCallback, UiCallback};
use crate::url::{domain_of, normalize_parsed, parse_http_url, url_slug, ScopeFilter};
use crate::{IngestError, Result, UrlError};
use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// How long a worker waits on an empty queue before re-checking shutdown
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Supervisory loop period
const TICK: Duration = Duration::from_millis(250);

/// How long the drain waits for each queue after stop sentinels are sent
const QUEUE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period for cancelled workers before they are aborted
const FORCE_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound of the wait while a circuit is open
const MAX_CIRCUIT_WAIT_SECS: u64 = 60;

/// Upper bound of the random pause added to `request_delay`
const MAX_JITTER_SECS: f64 = 0.5;

/// Error recorded for pages disallowed by robots.txt
pub const ROBOTS_BLOCKED: &str = "Blocked by robots.txt";

/// Thread-safe, idempotent shutdown trigger
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug, Default)]
struct ShutdownInner {
    requested: AtomicBool,
    notify: Notify,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the engine to stop; later calls have no effect
    pub fn request_shutdown(&self) {
        if !self.inner.requested.swap(true, Ordering::SeqCst) {
            tracing::info!("Shutdown requested");
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    pages_completed: AtomicU64,
    pages_failed: AtomicU64,
    assets_completed: AtomicU64,
    assets_failed: AtomicU64,
}

/// Completions per second, measured over windows of at least one second
#[derive(Debug)]
struct RateWindow {
    at: Instant,
    completed: u64,
    rate: f64,
}

impl RateWindow {
    fn update(&mut self, completed: u64) -> f64 {
        let elapsed = self.at.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            self.rate = completed.saturating_sub(self.completed) as f64 / elapsed;
            self.completed = completed;
            self.at = Instant::now();
        }
        self.rate
    }
}

/// Configures and builds an [`Engine`]
///
/// Fetch strategies, extractors and the UI observer can be swapped out;
/// anything left unset gets the default implementation.
pub struct EngineBuilder {
    seed: String,
    config: Config,
    ui: Option<Arc<dyn UiCallback>>,
    stealth: Option<Arc<dyn PageFetcher>>,
    browser: Option<Arc<dyn PageFetcher>>,
    extractors: Option<Extractors>,
}

impl EngineBuilder {
    pub fn ui(mut self, ui: Arc<dyn UiCallback>) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn stealth_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.stealth = Some(fetcher);
        self
    }

    pub fn browser_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.browser = Some(fetcher);
        self
    }

    pub fn extractors(mut self, extractors: Extractors) -> Self {
        self.extractors = Some(extractors);
        self
    }

    /// Validates the configuration and opens the site's state database
    pub fn build(self) -> Result<Engine> {
        let config = self.config;
        validate(&config)?;

        let mut seed_url = normalize_parsed(parse_http_url(&self.seed)?);
        seed_url.set_fragment(None);
        let seed = seed_url.to_string();

        let scope = ScopeFilter::new(&seed, config.scope)?;
        let paths = SitePaths::new(&config.data_dir, &seed_url);
        let store = StateStore::open_with_config(&paths.state_db(), &config)?;

        let default_stealth = StealthFetcher::new(&config, &seed_url)?;
        let robots = config
            .respect_robots
            .then(|| RobotsCache::new(default_stealth.client().clone()));
        let stealth = self
            .stealth
            .unwrap_or_else(|| Arc::new(default_stealth));
        let browser = self
            .browser
            .unwrap_or_else(|| Arc::new(BrowserFetcher::new(&config)));
        let assets = AssetClient::new(&config, &seed_url)?;
        let extractors = self
            .extractors
            .unwrap_or_else(|| Extractors::standard(&paths, &config));

        let (paused, _) = watch::channel(false);

        let inner = EngineInner {
            domain: domain_of(&seed),
            seed,
            scope,
            store,
            breaker: CircuitBreaker::new(config.circuit_threshold, config.circuit_timeout()),
            stealth,
            browser,
            assets,
            robots,
            classifier: LinkClassifier::new(&config.extra_asset_extensions),
            extractors,
            writer: ArtifactWriter::new(config.compression, config.compression_level),
            audit: AuditLog::new(paths.audit_log()),
            paths,
            ui: self.ui.unwrap_or_else(|| Arc::new(TracingCallback)),
            page_queue: WorkQueue::new("pages"),
            asset_queue: WorkQueue::new("assets"),
            seen_pages: Mutex::new(HashSet::new()),
            seen_assets: Mutex::new(HashSet::new()),
            permits: Semaphore::new(config.workers),
            browser_mode: AtomicBool::new(false),
            shutdown: ShutdownHandle::new(),
            cancel: CancellationToken::new(),
            paused,
            counters: Counters::default(),
            started: OnceLock::new(),
            rate: Mutex::new(RateWindow {
                at: Instant::now(),
                completed: 0,
                rate: 0.0,
            }),
            state: Mutex::new(EngineState::Starting),
            config,
        };

        Ok(Engine {
            inner: Arc::new(inner),
        })
    }
}

/// One crawl of one site
///
/// Cloning is cheap and yields another handle to the same crawl, so one
/// clone can run while another pauses, resumes or stops it.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: Config,
    seed: String,
    domain: String,
    scope: ScopeFilter,
    paths: SitePaths,
    store: StateStore,
    breaker: CircuitBreaker,
    stealth: Arc<dyn PageFetcher>,
    browser: Arc<dyn PageFetcher>,
    assets: AssetClient,
    robots: Option<RobotsCache>,
    classifier: LinkClassifier,
    extractors: Extractors,
    writer: ArtifactWriter,
    audit: AuditLog,
    ui: Arc<dyn UiCallback>,
    page_queue: WorkQueue,
    asset_queue: WorkQueue,
    seen_pages: Mutex<HashSet<String>>,
    seen_assets: Mutex<HashSet<String>>,
    permits: Semaphore,
    browser_mode: AtomicBool,
    shutdown: ShutdownHandle,
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
    counters: Counters,
    started: OnceLock<Instant>,
    rate: Mutex<RateWindow>,
    state: Mutex<EngineState>,
}

impl Engine {
    /// Starts building an engine for `seed`
    pub fn builder(seed: &str, config: Config) -> EngineBuilder {
        EngineBuilder {
            seed: seed.to_string(),
            config,
            ui: None,
            stealth: None,
            browser: None,
            extractors: None,
        }
    }

    /// Builds an engine with the default strategies and extractors
    pub fn new(seed: &str, config: Config) -> Result<Self> {
        Self::builder(seed, config).build()
    }

    /// The normalized seed URL
    pub fn seed(&self) -> &str {
        &self.inner.seed
    }

    pub fn paths(&self) -> &SitePaths {
        &self.inner.paths
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.inner.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.inner.shutdown.request_shutdown();
    }

    /// Stops workers from taking new work until [`Engine::resume`]
    pub fn pause(&self) {
        if !self.inner.paused.send_replace(true) {
            self.inner.set_state(EngineState::Paused, Some("paused by user"));
        }
    }

    pub fn resume(&self) {
        if self.inner.paused.send_replace(false) {
            self.inner.set_state(EngineState::Running, Some("resumed by user"));
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.inner.paused.borrow()
    }

    pub fn is_browser_mode(&self) -> bool {
        self.inner.is_browser_mode()
    }

    /// Circuit state of the seed's domain
    pub fn circuit_state(&self) -> CircuitState {
        self.inner.breaker.get_state(&self.inner.domain)
    }

    pub fn stats(&self) -> EngineStats {
        self.inner.stats()
    }

    /// Runs the crawl to completion or until shutdown
    ///
    /// Closes the fetchers and the state database before returning, so an
    /// engine runs once.
    pub async fn run(&self) -> Result<Summary> {
        let inner = &self.inner;
        let _ = inner.started.set(Instant::now());

        inner.paths.create_dirs().await?;
        inner.store.initialize().await?;
        inner.load_state().await?;

        inner.set_state(EngineState::Running, None);
        tracing::info!(
            "Crawling {} with {} page workers and {} asset workers",
            inner.seed,
            inner.config.workers,
            inner.asset_worker_count()
        );

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        for id in 0..inner.config.workers {
            handles.push(tokio::spawn(page_worker(self.inner.clone(), id)));
        }
        for id in 0..inner.asset_worker_count() {
            handles.push(tokio::spawn(asset_worker(self.inner.clone(), id)));
        }

        let interrupted = inner.supervise().await;
        let deadline = inner.drain_deadline();

        if interrupted {
            inner.set_state(EngineState::Stopping, Some("shutdown requested"));
            inner.cancel.cancel();
        } else {
            inner.set_state(EngineState::Stopping, Some("queues drained"));
            inner.send_stop_sentinels();
            for queue in [&inner.page_queue, &inner.asset_queue] {
                if !queue.join(QUEUE_DRAIN_TIMEOUT).await {
                    tracing::warn!("Timed out draining the {} queue", queue.name());
                }
            }
        }

        inner.await_workers(handles, deadline).await;
        inner.ui.on_progress(&inner.stats());

        let summary = generate_summary(&inner.store, &inner.seed, inner.paths.root()).await;

        inner.stealth.close().await;
        inner.browser.close().await;
        inner.store.close();
        inner.set_state(EngineState::Stopped, None);

        let mut summary = summary?;
        summary.elapsed_seconds = Some(inner.elapsed().as_secs_f64());
        summary.browser_mode = inner.is_browser_mode();
        Ok(summary)
    }
}

impl EngineInner {
    fn mode(&self) -> &'static str {
        if self.is_browser_mode() {
            "browser"
        } else {
            "stealth"
        }
    }

    fn is_browser_mode(&self) -> bool {
        self.browser_mode.load(Ordering::SeqCst)
    }

    fn asset_worker_count(&self) -> usize {
        if self.config.extract_assets {
            self.config.asset_workers
        } else {
            0
        }
    }

    fn extracts_assets(&self) -> bool {
        self.asset_worker_count() > 0
    }

    fn should_stop(&self) -> bool {
        self.shutdown.is_requested() || self.cancel.is_cancelled()
    }

    fn elapsed(&self) -> Duration {
        self.started.get().map(Instant::elapsed).unwrap_or_default()
    }

    fn set_state(&self, state: EngineState, reason: Option<&str>) {
        let previous = {
            let mut current = lock(&self.state);
            std::mem::replace(&mut *current, state)
        };
        tracing::debug!("Engine {} -> {}", previous, state);
        self.ui.on_state_change(state, self.mode(), previous, reason);
    }

    fn stats(&self) -> EngineStats {
        let pages_completed = self.counters.pages_completed.load(Ordering::Relaxed);
        let pages_per_second = lock(&self.rate).update(pages_completed);
        let seen_pages = lock(&self.seen_pages).len();
        let seen_assets = lock(&self.seen_assets).len();

        EngineStats {
            pages_completed,
            pages_failed: self.counters.pages_failed.load(Ordering::Relaxed),
            pages_total: seen_pages as u64,
            assets_completed: self.counters.assets_completed.load(Ordering::Relaxed),
            assets_failed: self.counters.assets_failed.load(Ordering::Relaxed),
            assets_total: seen_assets as u64,
            queue_pending: self.page_queue.len() + self.asset_queue.len(),
            seen_pages,
            seen_assets,
            pages_per_second,
            browser_mode: self.is_browser_mode(),
            elapsed_seconds: self.elapsed().as_secs_f64(),
        }
    }

    /// Rebuilds seen sets and counters, queues unfinished work, seeds if empty
    async fn load_state(&self) -> Result<()> {
        let records = self.store.all_urls().await?;
        let max_retries = self.config.max_retries;

        {
            let mut pages = lock(&self.seen_pages);
            let mut assets = lock(&self.seen_assets);
            for record in &records {
                let (seen, completed, failed) = if record.kind == Some(UrlKind::Asset) {
                    (
                        &mut *assets,
                        &self.counters.assets_completed,
                        &self.counters.assets_failed,
                    )
                } else {
                    (
                        &mut *pages,
                        &self.counters.pages_completed,
                        &self.counters.pages_failed,
                    )
                };

                seen.insert(record.url.clone());
                match record.status {
                    UrlStatus::Completed => {
                        completed.fetch_add(1, Ordering::Relaxed);
                    }
                    UrlStatus::Failed if record.retries >= max_retries => {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
            }
        }

        for url in self.store.get_pending_urls(UrlKind::Page, max_retries).await? {
            self.page_queue.put(url);
        }
        if self.extracts_assets() {
            for url in self.store.get_pending_urls(UrlKind::Asset, max_retries).await? {
                self.asset_queue.put(url);
            }
        }

        let nothing_seen = lock(&self.seen_pages).is_empty();
        if self.page_queue.is_empty() && nothing_seen {
            self.store
                .add_url(&self.seed, UrlStatus::Pending, UrlKind::Page)
                .await?;
            lock(&self.seen_pages).insert(self.seed.clone());
            self.page_queue.put(self.seed.clone());
            tracing::info!("Seeded {}", self.seed);
        } else {
            tracing::info!(
                "Resuming: {} known URLs, {} pages and {} assets queued",
                records.len(),
                self.page_queue.len(),
                self.asset_queue.len()
            );
        }

        Ok(())
    }

    /// Ticks until both queues are finished (false) or shutdown (true)
    async fn supervise(&self) -> bool {
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut circuit = CircuitState::Closed;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.wait() => {}
            }

            self.ui.on_progress(&self.stats());

            let state = self.breaker.get_state(&self.domain);
            if state != circuit {
                tracing::info!("Circuit for {} is {}", self.domain, state);
                self.ui.on_circuit_change(state.as_str());
                circuit = state;
            }

            if self.shutdown.is_requested() {
                return true;
            }
            if self.page_queue.unfinished() == 0 && self.asset_queue.unfinished() == 0 {
                return false;
            }
        }
    }

    /// `max(min_shutdown, unfinished * 2s)`
    fn drain_deadline(&self) -> Duration {
        let unfinished = self.page_queue.unfinished() + self.asset_queue.unfinished();
        self.config
            .min_shutdown()
            .max(Duration::from_secs_f64(unfinished as f64 * 2.0))
    }

    fn send_stop_sentinels(&self) {
        for _ in 0..self.config.workers {
            self.page_queue.put_stop();
        }
        for _ in 0..self.asset_worker_count() {
            self.asset_queue.put_stop();
        }
    }

    /// Joins workers; past `deadline` they are cancelled, then aborted
    async fn await_workers(&self, mut handles: Vec<JoinHandle<()>>, deadline: Duration) {
        let joined =
            tokio::time::timeout(deadline, futures::future::join_all(handles.iter_mut())).await;

        let results = match joined {
            Ok(results) => results,
            Err(_) => {
                tracing::warn!(
                    "Workers still running after {:.1}s, cancelling",
                    deadline.as_secs_f64()
                );
                self.cancel.cancel();
                let remaining = handles.iter_mut().filter(|handle| !handle.is_finished());
                match tokio::time::timeout(
                    FORCE_STOP_TIMEOUT,
                    futures::future::join_all(remaining),
                )
                .await
                {
                    Ok(results) => results,
                    Err(_) => {
                        tracing::error!("Aborting unresponsive workers");
                        for handle in &handles {
                            handle.abort();
                        }
                        return;
                    }
                }
            }
        };

        for result in results {
            if let Err(e) = result {
                tracing::error!("Worker task failed: {}", e);
            }
        }
    }

    /// Returns false when the engine is stopping
    async fn wait_while_paused(&self) -> bool {
        let mut paused = self.paused.subscribe();
        loop {
            if self.should_stop() {
                return false;
            }
            let is_paused = *paused.borrow_and_update();
            if !is_paused {
                return true;
            }

            tokio::select! {
                changed = paused.changed() => {
                    if changed.is_err() {
                        return true;
                    }
                }
                _ = self.shutdown.wait() => return false,
                _ = self.cancel.cancelled() => return false,
            }
        }
    }

    fn escalate(&self, status: u16) {
        if !self.browser_mode.swap(true, Ordering::SeqCst) {
            tracing::warn!("Received HTTP {}, switching to browser mode", status);
            self.ui.on_mode_change(true);
        }
    }

    /// Seconds to sleep while the circuit is open: `min(2^failures, 60)`,
    /// never longer than the block itself
    fn circuit_wait(&self, domain: &str) -> Duration {
        let failures = self.breaker.failures(domain).min(6);
        let secs = (1u64 << failures).min(MAX_CIRCUIT_WAIT_SECS);
        Duration::from_secs(secs).min(self.breaker.timeout())
    }

    /// One dequeued page: circuit gate, permit, pacing, processing
    async fn handle_page(&self, url: &str) {
        let domain = domain_of(url);

        if !self.breaker.should_allow(&domain) {
            tracing::debug!("Circuit open for {}, requeueing {}", domain, url);
            self.page_queue.put(url.to_string());
            tokio::time::sleep(self.circuit_wait(&domain)).await;
            return;
        }

        let result = {
            let Ok(_permit) = self.permits.acquire().await else {
                return;
            };
            if !self.breaker.should_allow(&domain) {
                self.page_queue.put(url.to_string());
                return;
            }

            self.pace().await;
            self.process_page(url, &domain).await
        };

        if let Err(e) = result {
            self.handle_page_error(url, &domain, e).await;
        }
    }

    /// Sleeps `request_delay` plus jitter
    async fn pace(&self) {
        if self.config.request_delay <= 0.0 {
            return;
        }
        let jitter = rand::thread_rng().gen_range(0.0..MAX_JITTER_SECS);
        tokio::time::sleep(self.config.request_delay() + Duration::from_secs_f64(jitter)).await;
    }

    async fn fetch_page(&self, url: &str) -> std::result::Result<FetchOutcome, FetchError> {
        if !self.is_browser_mode() {
            match self.stealth.fetch(url).await? {
                FetchOutcome::Hostile(status) => self.escalate(status),
                outcome => return Ok(outcome),
            }
        }

        match self.browser.fetch(url).await? {
            FetchOutcome::Hostile(status) => Err(FetchError::Http { status }),
            outcome => Ok(outcome),
        }
    }

    /// Fetch, extract, write, discover, mark completed
    ///
    /// Pages that can never succeed (robots, 500, challenge) are marked failed
    /// here and return `Ok`; every `Err` goes through the retry policy.
    async fn process_page(&self, url: &str, domain: &str) -> Result<()> {
        let started = Instant::now();
        let parsed = Url::parse(url).map_err(|e| UrlError::Parse(format!("{}: {}", url, e)))?;

        if let Some(robots) = &self.robots {
            if !robots.is_allowed(&parsed).await {
                self.fail_permanently(url, "robots", ROBOTS_BLOCKED).await;
                return Ok(());
            }
        }

        if !self.wait_while_paused().await {
            return Ok(());
        }

        let page = match self.fetch_page(url).await? {
            FetchOutcome::Page(page) => page,
            FetchOutcome::ServerError(status) => {
                self.breaker.record_failure(domain);
                let message = format!("Server Side Error ({})", status);
                self.fail_permanently(url, "server_error", &message).await;
                return Ok(());
            }
            FetchOutcome::Hostile(status) => return Err(FetchError::Http { status }.into()),
        };

        if page.body.is_empty() {
            return Err(FetchError::EmptyBody.into());
        }
        let html = page.html();

        if self.config.detect_captcha {
            if let Some(kind) = detect_captcha(&html) {
                let message = format!("CAPTCHA: {}", kind);
                self.fail_permanently(url, "captcha", &message).await;
                return Ok(());
            }
        }

        self.breaker.record_success(domain);

        let metadata_task = {
            let extractor = self.extractors.metadata.clone();
            let (html, url) = (html.clone(), url.to_string());
            tokio::task::spawn_blocking(move || extractor.extract(&html, &url))
        };
        let text_task = {
            let extractor = self.extractors.text.clone();
            let (html, url) = (html, url.to_string());
            tokio::task::spawn_blocking(move || extractor.extract(&pre_clean(&html), &url))
        };
        let (metadata, text) = tokio::try_join!(metadata_task, text_task)?;
        let (metadata, text) = (metadata?, text?);

        let body = enhance_markdown(&text, &metadata.headers);
        let slug = url_slug(&parsed, self.scope.seed());
        let path = self
            .writer
            .artifact_path(&self.paths.content_dir(), &slug);
        let size_bytes = self.writer.write(&path, &metadata, &body).await?;

        let links = discover_links(&page, &self.scope, &self.classifier);
        self.queue_links(&links).await?;

        self.store
            .update_status(url, UrlStatus::Completed, None)
            .await?;
        self.counters.pages_completed.fetch_add(1, Ordering::Relaxed);

        let record = AuditRecord::Completed {
            url: url.to_string(),
            title: metadata.title.clone(),
            path: self.relative_path(&path),
            assets: links.assets,
        };
        if let Err(e) = self.audit.append(&record).await {
            tracing::warn!("Could not append to audit log: {}", e);
        }

        self.ui.on_activity(&ActivityEntry {
            url: url.to_string(),
            title: metadata.title,
            engine: self.extractors.text.name().to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            size_bytes,
            timestamp: Utc::now(),
        });

        Ok(())
    }

    /// Adds unseen links to the seen sets, the database and the queues
    async fn queue_links(&self, links: &DiscoveredLinks) -> Result<()> {
        let new_pages = claim_unseen(&self.seen_pages, &links.pages);
        let new_assets = if self.extracts_assets() {
            claim_unseen(&self.seen_assets, &links.assets)
        } else {
            Vec::new()
        };

        if new_pages.is_empty() && new_assets.is_empty() {
            return Ok(());
        }

        let (pages_added, assets_added) = tokio::try_join!(
            self.store
                .add_urls_batch(&new_pages, UrlStatus::Pending, UrlKind::Page),
            self.store
                .add_urls_batch(&new_assets, UrlStatus::Pending, UrlKind::Asset),
        )?;
        tracing::debug!(
            "Queued {} new pages and {} new assets",
            pages_added,
            assets_added
        );

        for url in new_pages {
            self.page_queue.put(url);
        }
        for url in new_assets {
            self.asset_queue.put(url);
        }
        Ok(())
    }

    /// Retry policy: back off and requeue, or fail once retries run out
    async fn handle_page_error(&self, url: &str, domain: &str, err: IngestError) {
        self.breaker.record_failure(domain);
        let message = err.to_string();
        self.ui.on_error(url, error_kind(&err), &message);

        let retries = match self.store.increment_retry(url).await {
            Ok(retries) => retries,
            Err(e) => {
                tracing::error!("Could not record retry for {}: {}", url, e);
                return;
            }
        };

        if retries < self.config.max_retries {
            let backoff = backoff_delay(retries);
            tracing::warn!(
                url,
                retries,
                "Attempt failed: {}; retrying in {}s",
                message,
                backoff.as_secs()
            );
            if let Err(e) = self
                .store
                .update_status(url, UrlStatus::Pending, Some(&message))
                .await
            {
                tracing::warn!("Could not record error for {}: {}", url, e);
            }
            tokio::time::sleep(backoff).await;
            self.page_queue.put(url.to_string());
        } else {
            tracing::error!(url, retries, "Giving up: {}", message);
            self.mark_failed(url, &message, retries).await;
        }
    }

    /// Marks a page failed without retry
    async fn fail_permanently(&self, url: &str, kind: &str, message: &str) {
        tracing::warn!(url, "{}", message);
        self.ui.on_error(url, kind, message);

        let retries = match self.store.get_url(url).await {
            Ok(Some(record)) => record.retries,
            _ => 0,
        };
        self.mark_failed(url, message, retries).await;
    }

    async fn mark_failed(&self, url: &str, message: &str, retries: u32) {
        if let Err(e) = self
            .store
            .update_status(url, UrlStatus::Failed, Some(message))
            .await
        {
            tracing::error!("Could not mark {} failed: {}", url, e);
        }
        self.counters.pages_failed.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self
            .audit
            .append(&AuditRecord::failed(url, message, retries))
            .await
        {
            tracing::warn!("Could not append to audit log: {}", e);
        }
    }

    /// Puts a cancelled page back to `pending`
    async fn release(&self, url: &str) {
        match self.store.release_url(url).await {
            Ok(_) => tracing::debug!("Released {}", url),
            Err(e) => tracing::warn!("Could not release {}: {}", url, e),
        }
    }

    /// Downloads and stores one asset; failures are final
    async fn handle_asset(&self, url: &str) {
        match self.download_asset(url).await {
            Ok(path) => {
                tracing::debug!("Saved {} to {}", url, path.display());
                if let Err(e) = self
                    .store
                    .update_status(url, UrlStatus::Completed, None)
                    .await
                {
                    tracing::error!("Could not mark {} completed: {}", url, e);
                }
                self.counters.assets_completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(url, "Asset failed: {}", message);
                if let Err(e) = self
                    .store
                    .update_status(url, UrlStatus::Failed, Some(&message))
                    .await
                {
                    tracing::error!("Could not mark {} failed: {}", url, e);
                }
                self.counters.assets_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn download_asset(&self, url: &str) -> Result<PathBuf> {
        let bytes = self.assets.download(url).await?;
        let extractor = self.extractors.asset.clone();
        let owned = url.to_string();
        let path = tokio::task::spawn_blocking(move || extractor.extract(&bytes, &owned)).await??;
        Ok(path)
    }

    fn relative_path(&self, path: &std::path::Path) -> String {
        path.strip_prefix(self.paths.root())
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Page worker loop
async fn page_worker(inner: Arc<EngineInner>, id: usize) {
    tracing::debug!("Page worker {} started", id);

    while inner.wait_while_paused().await {
        let item = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => break,
            item = inner.page_queue.get(DEQUEUE_TIMEOUT) => item,
        };
        let url = match item {
            Some(QueueItem::Url(url)) => url,
            Some(QueueItem::Stop) => {
                inner.page_queue.task_done();
                break;
            }
            None => continue,
        };

        let finished = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => false,
            _ = inner.handle_page(&url) => true,
        };

        if !finished {
            inner.release(&url).await;
            inner.page_queue.task_done();
            break;
        }
        inner.page_queue.task_done();
    }

    tracing::debug!("Page worker {} stopped", id);
}

/// Asset worker loop
async fn asset_worker(inner: Arc<EngineInner>, id: usize) {
    tracing::debug!("Asset worker {} started", id);

    while inner.wait_while_paused().await {
        let item = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => break,
            item = inner.asset_queue.get(DEQUEUE_TIMEOUT) => item,
        };
        let url = match item {
            Some(QueueItem::Url(url)) => url,
            Some(QueueItem::Stop) => {
                inner.asset_queue.task_done();
                break;
            }
            None => continue,
        };

        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => {
                inner.asset_queue.task_done();
                break;
            }
            _ = inner.handle_asset(&url) => {}
        }
        inner.asset_queue.task_done();
    }

    tracing::debug!("Asset worker {} stopped", id);
}

/// Marks the unseen URLs of `urls` as seen and returns them
fn claim_unseen(seen: &Mutex<HashSet<String>>, urls: &[String]) -> Vec<String> {
    let mut seen = lock(seen);
    urls.iter()
        .filter(|url| seen.insert((*url).clone()))
        .cloned()
        .collect()
}

/// `2^retries` seconds
fn backoff_delay(retries: u32) -> Duration {
    Duration::from_secs(1u64 << retries.min(16))
}

/// Label passed to [`UiCallback::on_error`]
fn error_kind(err: &IngestError) -> &'static str {
    match err {
        IngestError::Fetch(e) => e.kind(),
        IngestError::Extract(_) | IngestError::Join(_) => "extract",
        IngestError::Output(_) | IngestError::Io(_) => "output",
        IngestError::Storage(_) => "storage",
        IngestError::Url(_) => "url",
        IngestError::Config(_) => "config",
        IngestError::Reqwest(_) => "network",
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
