use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// The domain is the key used by the circuit breaker and the robots cache.
///
/// # Arguments
///
/// * `url` - The URL to extract the domain from
///
/// # Returns
///
/// * `Some(String)` - The lowercase domain/host
/// * `None` - If the URL has no host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_ingest::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Extracts the domain from a URL string, falling back to an empty key
pub fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| extract_domain(&u))
        .unwrap_or_default()
}

/// Directory name for a site's data: `host[:port]` with `.` and `:` as `_`
///
/// ```
/// use url::Url;
/// use sumi_ingest::url::domain_slug;
///
/// let url = Url::parse("http://Docs.Example.com:8080/guide").unwrap();
/// assert_eq!(domain_slug(&url), "docs_example_com_8080");
/// ```
pub fn domain_slug(url: &Url) -> String {
    let mut netloc = extract_domain(url).unwrap_or_else(|| "unknown".to_string());
    if let Some(port) = url.port() {
        netloc.push(':');
        netloc.push_str(&port.to_string());
    }
    netloc.replace(['.', ':'], "_")
}
