//! Extractor interfaces consumed by the engine

use crate::extract::ExtractError;
use serde::Serialize;
use std::path::PathBuf;

/// Converts cleaned HTML into a Markdown body
pub trait TextExtractor: Send + Sync {
    /// Engine name reported in activity entries
    fn name(&self) -> &str;

    fn extract(&self, html: &str, url: &str) -> Result<String, ExtractError>;
}

/// Reads the front-matter record of a page from its raw HTML
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, html: &str, url: &str) -> Result<PageMetadata, ExtractError>;
}

/// Stores a downloaded asset and returns where it was written
pub trait AssetExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], url: &str) -> Result<PathBuf, ExtractError>;
}

/// One entry of a page's heading outline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// YAML front-matter of a page artifact
///
/// Keys are written in declaration order; empty optional fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageMetadata {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sitename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_card: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_site: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_ld: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Heading>,
    pub ingestion_engine: String,
}
