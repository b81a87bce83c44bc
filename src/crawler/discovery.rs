//! Link discovery
//!
//! Pulls anchor and image targets out of a fetched page, resolves them
//! against the page URL and sorts them into pages to follow and assets to
//! download. Stylesheets, scripts and other noise are dropped.

use crate::crawler::fetcher::FetchedPage;
use crate::url::{normalize_parsed, ScopeFilter};
use std::collections::HashSet;
use url::Url;

/// Suffixes downloaded as assets
pub const ASSET_EXTENSIONS: &[&str] = &[
    ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".md", ".txt", ".csv",
];

/// Suffixes that are never followed
pub const NOISE_EXTENSIONS: &[&str] = &[".css", ".js", ".json", ".xml", ".ico"];

const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// How a discovered URL is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Page,
    Asset,
    Noise,
}

/// Classifies URLs by the suffix of their path
#[derive(Debug, Clone)]
pub struct LinkClassifier {
    asset_extensions: Vec<String>,
}

impl LinkClassifier {
    /// Creates a classifier with the built-in asset suffixes plus `extra`
    pub fn new(extra: &[String]) -> Self {
        let mut asset_extensions: Vec<String> =
            ASSET_EXTENSIONS.iter().map(|ext| ext.to_string()).collect();
        for ext in extra {
            let ext = ext.to_ascii_lowercase();
            if !asset_extensions.contains(&ext) {
                asset_extensions.push(ext);
            }
        }
        Self { asset_extensions }
    }

    pub fn asset_extensions(&self) -> &[String] {
        &self.asset_extensions
    }

    pub fn classify(&self, url: &Url) -> LinkKind {
        let path = url.path().to_ascii_lowercase();

        if self.asset_extensions.iter().any(|ext| path.ends_with(ext.as_str())) {
            LinkKind::Asset
        } else if NOISE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            LinkKind::Noise
        } else {
            LinkKind::Page
        }
    }
}

impl Default for LinkClassifier {
    fn default() -> Self {
        Self::new(&[])
    }
}

/// Links found on one page, each list deduplicated in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredLinks {
    pub pages: Vec<String>,
    pub assets: Vec<String>,
}

/// Extracts followable pages and assets from a fetched page
///
/// Both pages and assets must pass the scope filter.
pub fn discover_links(
    page: &FetchedPage,
    scope: &ScopeFilter,
    classifier: &LinkClassifier,
) -> DiscoveredLinks {
    let Ok(base) = Url::parse(&page.url) else {
        return DiscoveredLinks::default();
    };

    let mut raw = page.select_attr("a[href]", "href");
    raw.extend(page.select_attr("img[src]", "src"));

    let mut links = DiscoveredLinks::default();
    let mut seen = HashSet::new();

    for href in raw {
        let Some(url) = resolve_link(&base, &href) else {
            continue;
        };

        let kind = classifier.classify(&url);
        if kind == LinkKind::Noise || !scope.should_follow(&url) {
            continue;
        }

        let url = String::from(normalize_parsed(url));
        if !seen.insert(url.clone()) {
            continue;
        }

        match kind {
            LinkKind::Page => links.pages.push(url),
            LinkKind::Asset => links.assets.push(url),
            LinkKind::Noise => {}
        }
    }

    links
}

/// Resolves a raw attribute value against the page URL, dropping the fragment
fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    let lower = href.to_ascii_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || SKIPPED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}
