//! Robots.txt caching implementation
//!
//! Rules are fetched once per origin and reused until they are 24 hours old.

use crate::robots::RobotsRules;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use url::Url;

/// Product token matched against `User-agent` groups
pub const ROBOTS_AGENT: &str = "sumi-ingest";

/// How long a robots.txt fetch may take before the origin is treated as allow-all
const FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Cached robots.txt data for an origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt rules
    pub rules: RobotsRules,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Creates a new CachedRobots instance stamped with the current time
    pub fn new(rules: RobotsRules) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the cached robots.txt is stale (older than 24 hours)
    pub fn is_stale(&self) -> bool {
        self.age() > Duration::hours(24)
    }

    /// Returns the age of the cached robots.txt
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

/// Per-origin robots.txt cache backed by an HTTP client
///
/// The lock is held across the fetch so concurrent workers hitting a new
/// origin trigger a single request.
pub struct RobotsCache {
    client: reqwest::Client,
    entries: Mutex<HashMap<String, CachedRobots>>,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Checks whether `url` may be crawled
    ///
    /// A robots.txt answered with 401 or 403 blocks the whole origin. Missing,
    /// unreachable or otherwise non-200 files allow everything.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        let origin = url.origin().ascii_serialization();

        let rules = {
            let mut entries = self.entries.lock().await;
            match entries.get(&origin) {
                Some(cached) if !cached.is_stale() => cached.rules.clone(),
                _ => {
                    let rules = self.fetch(&origin).await;
                    entries.insert(origin, CachedRobots::new(rules.clone()));
                    rules
                }
            }
        };

        rules.is_allowed(url.as_str(), ROBOTS_AGENT)
    }

    /// Number of origins with cached rules
    pub async fn cached_origins(&self) -> usize {
        self.entries.lock().await.len()
    }

    async fn fetch(&self, origin: &str) -> RobotsRules {
        let robots_url = format!("{}/robots.txt", origin);

        let response = match self
            .client
            .get(&robots_url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Error loading robots.txt for {}: {}", origin, e);
                return RobotsRules::allow_all();
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            tracing::info!(status = %status, "robots.txt access denied for {}, disallowing all", origin);
            return RobotsRules::disallow_all();
        }
        if status != reqwest::StatusCode::OK {
            tracing::debug!(status = %status, "No robots.txt for {}", origin);
            return RobotsRules::allow_all();
        }

        match response.text().await {
            Ok(body) => {
                tracing::debug!("Loaded robots.txt for {} ({} bytes)", origin, body.len());
                RobotsRules::from_content(&body)
            }
            Err(e) => {
                tracing::warn!("Error reading robots.txt for {}: {}", origin, e);
                RobotsRules::allow_all()
            }
        }
    }
}
