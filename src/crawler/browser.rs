//! Headless browser fetch strategy
//!
//! The browser is launched lazily on the first fetch and shared by all
//! workers; a semaphore caps the number of concurrently open pages. Without
//! the `browser` feature every fetch fails with
//! [`FetchError::BrowserUnavailable`].

use crate::config::Config;
use crate::crawler::fetcher::{FetchError, FetchOutcome, PageFetcher};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Semaphore;

#[cfg(feature = "browser")]
use crate::crawler::captcha::is_challenge_pending;
#[cfg(feature = "browser")]
use crate::crawler::fetcher::FetchedPage;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use std::sync::Arc;
#[cfg(feature = "browser")]
use tokio::task::JoinHandle;

/// Builds a Chromium `--host-resolver-rules` value from DNS overrides
pub fn host_resolver_rules(overrides: &BTreeMap<String, String>) -> Option<String> {
    if overrides.is_empty() {
        return None;
    }

    let rules: Vec<String> = overrides
        .iter()
        .map(|(host, ip)| format!("MAP {} {}", host, ip))
        .collect();
    Some(rules.join(", "))
}

#[cfg(feature = "browser")]
struct BrowserSession {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
}

/// Headless Chromium strategy
pub struct BrowserFetcher {
    timeout: Duration,
    host_rules: Option<String>,
    pages: Semaphore,
    #[cfg(feature = "browser")]
    session: tokio::sync::Mutex<Option<BrowserSession>>,
}

impl BrowserFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            timeout: config.browser_timeout(),
            host_rules: host_resolver_rules(&config.dns_overrides),
            pages: Semaphore::new(config.browser_pages()),
            #[cfg(feature = "browser")]
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Navigation timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn host_rules(&self) -> Option<&str> {
        self.host_rules.as_deref()
    }

    /// Whether this build can drive a browser at all
    pub fn is_available() -> bool {
        cfg!(feature = "browser")
    }
}

#[cfg(feature = "browser")]
impl BrowserFetcher {
    /// Returns the running browser, launching it on first use
    async fn browser(&self) -> Result<Arc<Browser>, FetchError> {
        let mut session = self.session.lock().await;
        if let Some(existing) = session.as_ref() {
            return Ok(existing.browser.clone());
        }

        tracing::info!("Launching headless browser");
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .request_timeout(self.timeout);
        if let Some(rules) = &self.host_rules {
            builder = builder.arg(format!("--host-resolver-rules={}", rules));
        }
        let config = builder.build().map_err(FetchError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let browser = Arc::new(browser);
        *session = Some(BrowserSession {
            browser: browser.clone(),
            handler,
        });
        Ok(browser)
    }

    /// Waits for navigation, then for any challenge interstitial to clear
    async fn read_page(&self, page: &Page) -> Result<String, FetchError> {
        let deadline = tokio::time::Instant::now() + self.timeout;

        match tokio::time::timeout(self.timeout, page.wait_for_navigation()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(FetchError::Browser(e.to_string())),
            Err(_) => return Err(FetchError::Timeout),
        }

        loop {
            let content = page
                .content()
                .await
                .map_err(|e| FetchError::Browser(e.to_string()))?;

            if !is_challenge_pending(&content) || tokio::time::Instant::now() >= deadline {
                return Ok(content);
            }

            tracing::debug!("Waiting for challenge page to clear");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    #[cfg(feature = "browser")]
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        let _permit = self
            .pages
            .acquire()
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;
        let browser = self.browser().await?;

        let page = match tokio::time::timeout(self.timeout, browser.new_page(url)).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => return Err(FetchError::Browser(e.to_string())),
            Err(_) => return Err(FetchError::Timeout),
        };

        let result = self.read_page(&page).await;
        let _ = page.close().await;

        let content = result?;
        Ok(FetchOutcome::Page(FetchedPage {
            url: url.to_string(),
            status: 200,
            body: content.into_bytes(),
        }))
    }

    #[cfg(not(feature = "browser"))]
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        let _permit = self
            .pages
            .acquire()
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;
        tracing::debug!("Browser fetch of {} requested without browser support", url);
        Err(FetchError::BrowserUnavailable)
    }

    fn name(&self) -> &'static str {
        "browser"
    }

    #[cfg(feature = "browser")]
    async fn close(&self) {
        self.pages.close();
        let Some(session) = self.session.lock().await.take() else {
            return;
        };

        if let Ok(mut browser) = Arc::try_unwrap(session.browser) {
            if let Err(e) = browser.close().await {
                tracing::warn!("Failed to close browser: {}", e);
            }
            let _ = browser.wait().await;
        }
        session.handler.abort();
    }

    #[cfg(not(feature = "browser"))]
    async fn close(&self) {
        self.pages.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_resolver_rules() {
        assert_eq!(host_resolver_rules(&BTreeMap::new()), None);

        let mut overrides = BTreeMap::new();
        overrides.insert("b.test".to_string(), "10.0.0.2".to_string());
        overrides.insert("a.test".to_string(), "10.0.0.1".to_string());
        assert_eq!(
            host_resolver_rules(&overrides).as_deref(),
            Some("MAP a.test 10.0.0.1, MAP b.test 10.0.0.2")
        );
    }

    #[test]
    fn test_new_from_config() {
        let config = Config {
            browser_timeout_ms: 1500,
            ..Config::default()
        };
        let fetcher = BrowserFetcher::new(&config);
        assert_eq!(fetcher.timeout(), Duration::from_millis(1500));
        assert!(fetcher.host_rules().is_none());
        assert_eq!(fetcher.name(), "browser");
    }

    #[cfg(not(feature = "browser"))]
    #[tokio::test]
    async fn test_unavailable_without_feature() {
        let fetcher = BrowserFetcher::new(&Config::default());
        assert!(!BrowserFetcher::is_available());
        assert!(matches!(
            fetcher.fetch("https://ex.test/").await,
            Err(FetchError::BrowserUnavailable)
        ));
    }
}
