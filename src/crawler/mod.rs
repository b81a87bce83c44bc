//! Crawler module for fetching pages and driving the crawl
//!
//! This module contains the core crawling logic, including:
//! - The stealth HTTP and headless browser fetch strategies
//! - Challenge page detection
//! - Link discovery and classification
//! - The work queues and the engine that runs the worker pools

mod browser;
mod captcha;
mod discovery;
mod engine;
mod fetcher;
mod queue;
mod resolver;

pub use browser::{host_resolver_rules, BrowserFetcher};
pub use captcha::{detect_captcha, is_challenge_pending, ChallengeKind};
pub use discovery::{
    discover_links, DiscoveredLinks, LinkClassifier, LinkKind, ASSET_EXTENSIONS, NOISE_EXTENSIONS,
};
pub use engine::{Engine, EngineBuilder, ShutdownHandle, ROBOTS_BLOCKED};
pub use fetcher::{
    apply_dns_overrides, build_asset_client, build_stealth_client, classify_status, AssetClient,
    FetchError, FetchOutcome, FetchedPage, PageFetcher, StealthFetcher, USER_AGENT,
};
pub use queue::{QueueItem, WorkQueue};
pub use resolver::CachingResolver;
