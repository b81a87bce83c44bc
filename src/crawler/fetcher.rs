//! HTTP fetcher implementation
//!
//! This module handles the HTTP side of the crawler, including:
//! - The common fetch contract shared by the stealth and browser strategies
//! - Building the stealth client with browser impersonation headers
//! - Building the pooled asset client
//! - Mapping status codes onto fetch outcomes

use crate::config::Config;
use crate::crawler::resolver::CachingResolver;
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder};
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// User agent presented by both HTTP clients
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Total timeout for a single asset download
pub const ASSET_TIMEOUT: Duration = Duration::from_secs(60);

/// How long the asset client keeps resolved addresses
pub const DNS_CACHE_TTL: Duration = Duration::from_secs(300);

/// Fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Empty response body")]
    EmptyBody,

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Browser support is not compiled in (build with --features browser)")]
    BrowserUnavailable,
}

impl FetchError {
    /// Converts a reqwest error, splitting out timeouts
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err)
        }
    }

    /// Short machine-friendly label used in error notifications
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
            Self::EmptyBody => "empty_body",
            Self::Browser(_) => "browser",
            Self::BrowserUnavailable => "browser_unavailable",
        }
    }
}

/// A fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: String,
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchedPage {
    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn html(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns the value of `attr` for every element matching `selector`
    ///
    /// An unparsable selector yields no values.
    pub fn select_attr(&self, selector: &str, attr: &str) -> Vec<String> {
        let Ok(selector) = Selector::parse(selector) else {
            return Vec::new();
        };

        let document = Html::parse_document(&self.html());
        document
            .select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .map(|value| value.trim().to_string())
            .collect()
    }
}

/// What a fetch strategy produced for a URL
#[derive(Debug)]
pub enum FetchOutcome {
    /// 2xx response
    Page(FetchedPage),
    /// HTTP 500: the page is failed without retry
    ServerError(u16),
    /// 401/403/429: the engine should switch to the browser strategy
    Hostile(u16),
}

/// Common contract of the stealth and browser strategies
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches a URL
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError>;

    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Releases any long-lived resources
    async fn close(&self) {}
}

/// Maps a status code onto an outcome; `None` means the body should be read
pub fn classify_status(status: u16) -> Option<Result<FetchOutcome, FetchError>> {
    match status {
        200..=299 => None,
        500 => Some(Ok(FetchOutcome::ServerError(status))),
        401 | 403 | 429 => Some(Ok(FetchOutcome::Hostile(status))),
        _ => Some(Err(FetchError::Http { status })),
    }
}

/// Builds the header set a desktop Chrome sends on navigation
fn browser_headers(seed: &Url) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
    headers.insert("Sec-Fetch-User", HeaderValue::from_static("?1"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

    insert_seed_headers(&mut headers, seed);
    headers
}

/// Sets `Referer` and `Origin` to the seed
fn insert_seed_headers(headers: &mut HeaderMap, seed: &Url) {
    if let Ok(referer) = HeaderValue::from_str(seed.as_str()) {
        headers.insert(header::REFERER, referer);
    }
    if let Ok(origin) = HeaderValue::from_str(&seed.origin().ascii_serialization()) {
        headers.insert(header::ORIGIN, origin);
    }
}

/// Pins hosts to fixed addresses; the port of the request URL is kept
pub fn apply_dns_overrides(
    mut builder: ClientBuilder,
    overrides: &BTreeMap<String, String>,
) -> ClientBuilder {
    for (host, ip) in overrides {
        match ip.parse::<IpAddr>() {
            Ok(ip) => builder = builder.resolve(host, SocketAddr::new(ip, 0)),
            Err(_) => tracing::warn!("Ignoring DNS override {} -> {}", host, ip),
        }
    }
    builder
}

/// Builds the stealth page client
///
/// # Arguments
///
/// * `config` - Crawl configuration (timeout and DNS overrides)
/// * `seed` - Seed URL, sent as `Referer` and `Origin`
pub fn build_stealth_client(config: &Config, seed: &Url) -> Result<Client, reqwest::Error> {
    let builder = Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(browser_headers(seed))
        .timeout(config.request_timeout())
        .connect_timeout(Duration::from_secs(10))
        .tcp_keepalive(Duration::from_secs(60))
        .pool_idle_timeout(Duration::from_secs(90))
        .gzip(true)
        .brotli(true);

    apply_dns_overrides(builder, &config.dns_overrides).build()
}

/// Builds the asset download client
///
/// Keeps up to `asset_workers * 2` idle connections per host and caches DNS
/// answers for [`DNS_CACHE_TTL`].
pub fn build_asset_client(config: &Config, seed: &Url) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    insert_seed_headers(&mut headers, seed);
    headers.remove(header::ORIGIN);

    let builder = Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(ASSET_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(config.asset_workers.max(1) * 2)
        .tcp_keepalive(Duration::from_secs(60))
        .dns_resolver(Arc::new(CachingResolver::new(DNS_CACHE_TTL)))
        .gzip(true)
        .brotli(true);

    apply_dns_overrides(builder, &config.dns_overrides).build()
}

/// Cheap HTTP strategy impersonating a desktop browser
#[derive(Debug, Clone)]
pub struct StealthFetcher {
    client: Client,
}

impl StealthFetcher {
    pub fn new(config: &Config, seed: &Url) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_stealth_client(config, seed)?,
        })
    }

    /// The underlying client, shared with the robots.txt cache
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl PageFetcher for StealthFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status().as_u16();
        if let Some(outcome) = classify_status(status) {
            tracing::debug!("{} -> {}", url, status);
            return outcome;
        }

        let body = response.bytes().await.map_err(FetchError::from_reqwest)?;
        Ok(FetchOutcome::Page(FetchedPage {
            url: url.to_string(),
            status,
            body: body.to_vec(),
        }))
    }

    fn name(&self) -> &'static str {
        "stealth"
    }
}

/// Pooled client used only for asset downloads
#[derive(Debug, Clone)]
pub struct AssetClient {
    client: Client,
}

impl AssetClient {
    pub fn new(config: &Config, seed: &Url) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_asset_client(config, seed)?,
        })
    }

    /// Downloads an asset; anything but 200 is an error
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(FetchError::Http { status });
        }

        let bytes = response.bytes().await.map_err(FetchError::from_reqwest)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> Config {
        Config {
            timeout_seconds: 2.0,
            ..Config::default()
        }
    }

    async fn fetch(server: &MockServer, route: &str) -> Result<FetchOutcome, FetchError> {
        let seed = Url::parse(&server.uri()).unwrap();
        let fetcher = StealthFetcher::new(&test_config(), &seed).unwrap();
        fetcher.fetch(&format!("{}{}", server.uri(), route)).await
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(200).is_none());
        assert!(classify_status(204).is_none());
        assert!(matches!(
            classify_status(500),
            Some(Ok(FetchOutcome::ServerError(500)))
        ));
        for status in [401, 403, 429] {
            assert!(matches!(
                classify_status(status),
                Some(Ok(FetchOutcome::Hostile(_)))
            ));
        }
        assert!(matches!(
            classify_status(404),
            Some(Err(FetchError::Http { status: 404 }))
        ));
        assert!(matches!(
            classify_status(503),
            Some(Err(FetchError::Http { status: 503 }))
        ));
    }

    #[test]
    fn test_http_error_message() {
        assert_eq!(FetchError::Http { status: 404 }.to_string(), "HTTP 404");
    }

    #[test]
    fn test_select_attr() {
        let page = FetchedPage {
            url: "https://ex.test/".to_string(),
            status: 200,
            body: br#"<a href="/a">A</a><a href=" /b ">B</a><a>none</a><img src="x.png">"#
                .to_vec(),
        };
        assert_eq!(page.select_attr("a[href]", "href"), vec!["/a", "/b"]);
        assert_eq!(page.select_attr("img[src]", "src"), vec!["x.png"]);
        assert!(page.select_attr("[[bad", "href").is_empty());
    }

    #[test]
    fn test_html_replaces_invalid_utf8() {
        let page = FetchedPage {
            url: "https://ex.test/".to_string(),
            status: 200,
            body: vec![b'o', b'k', 0xff],
        };
        assert_eq!(page.html(), "ok\u{fffd}");
    }

    #[tokio::test]
    async fn test_fetch_success_sends_seed_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("referer", format!("{}/", server.uri()).as_str()))
            .and(header("origin", server.uri().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hi</p>"))
            .mount(&server)
            .await;

        match fetch(&server, "/page").await.unwrap() {
            FetchOutcome::Page(page) => {
                assert_eq!(page.status, 200);
                assert_eq!(page.html(), "<p>hi</p>");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_status_mapping() {
        let server = MockServer::start().await;
        for (route, status) in [("/500", 500), ("/403", 403), ("/404", 404)] {
            Mock::given(path(route))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }

        assert!(matches!(
            fetch(&server, "/500").await,
            Ok(FetchOutcome::ServerError(500))
        ));
        assert!(matches!(
            fetch(&server, "/403").await,
            Ok(FetchOutcome::Hostile(403))
        ));
        assert!(matches!(
            fetch(&server, "/404").await,
            Err(FetchError::Http { status: 404 })
        ));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        assert!(matches!(
            fetch(&server, "/slow").await,
            Err(FetchError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_asset_download() {
        let server = MockServer::start().await;
        Mock::given(path("/img.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;
        Mock::given(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let seed = Url::parse(&server.uri()).unwrap();
        let client = AssetClient::new(&test_config(), &seed).unwrap();

        let bytes = client
            .download(&format!("{}/img.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);

        let err = client
            .download(&format!("{}/missing.png", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP 404");
    }

    #[test]
    fn test_dns_overrides_build() {
        let mut config = test_config();
        config
            .dns_overrides
            .insert("docs.internal".to_string(), "10.0.0.7".to_string());
        let seed = Url::parse("https://docs.internal/").unwrap();
        assert!(build_stealth_client(&config, &seed).is_ok());
        assert!(build_asset_client(&config, &seed).is_ok());
    }
}
