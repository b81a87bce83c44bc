//! Content extraction
//!
//! The engine talks to three extractor interfaces and is handed concrete
//! implementations at construction time:
//! - [`TextExtractor`]: cleaned HTML to Markdown (default: `htmd`)
//! - [`MetadataExtractor`]: raw HTML to a front-matter record (default: `scraper`)
//! - [`AssetExtractor`]: downloaded bytes to a file under `media/`

mod asset;
mod clean;
mod metadata;
mod text;
mod traits;

pub use asset::{FileAssetExtractor, DOCUMENT_EXTENSIONS};
pub use clean::{pre_clean, truncate_html, MAX_HTML_BYTES, NOISE_SELECTORS};
pub use metadata::{ingestion_engine, HtmlMetadataExtractor, DEFAULT_TITLE};
pub use text::HtmdTextExtractor;
pub use traits::{AssetExtractor, Heading, MetadataExtractor, PageMetadata, TextExtractor};

use crate::config::Config;
use crate::output::SitePaths;
use std::sync::Arc;
use thiserror::Error;

/// Extraction errors
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTML conversion failed: {0}")]
    Html(String),

    #[error("Asset error: {0}")]
    Asset(String),
}

/// The set of extractors an engine runs with
#[derive(Clone)]
pub struct Extractors {
    pub text: Arc<dyn TextExtractor>,
    pub metadata: Arc<dyn MetadataExtractor>,
    pub asset: Arc<dyn AssetExtractor>,
}

impl Extractors {
    /// Default implementations writing assets under the site's media dirs
    pub fn standard(paths: &SitePaths, config: &Config) -> Self {
        Self {
            text: Arc::new(HtmdTextExtractor::new()),
            metadata: Arc::new(HtmlMetadataExtractor),
            asset: Arc::new(FileAssetExtractor::new(
                paths.images_dir(),
                paths.docs_dir(),
                &config.extra_asset_extensions,
            )),
        }
    }
}
