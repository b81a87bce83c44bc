//! Asset storage under the site's media directories

use crate::extract::metadata::ingestion_engine;
use crate::extract::traits::AssetExtractor;
use crate::extract::ExtractError;
use crate::output::writer::{compose_artifact, write_atomic_sync};
use crate::url::{percent_decode_str, slugify};
use serde::Serialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Suffixes stored under `media/docs`; everything else goes to `media/images`
pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    ".pdf", ".docx", ".pptx", ".xlsx", ".md", ".txt", ".csv",
];

#[derive(Debug, Serialize)]
struct AssetFrontMatter<'a> {
    url: &'a str,
    title: &'a str,
    source_file: &'a str,
    ingestion_engine: String,
}

/// Writes asset bytes to disk under a slugified file name
#[derive(Debug, Clone)]
pub struct FileAssetExtractor {
    images_dir: PathBuf,
    docs_dir: PathBuf,
    document_extensions: Vec<String>,
}

impl FileAssetExtractor {
    pub fn new(images_dir: PathBuf, docs_dir: PathBuf, extra_extensions: &[String]) -> Self {
        let mut document_extensions: Vec<String> =
            DOCUMENT_EXTENSIONS.iter().map(|e| e.to_string()).collect();
        document_extensions.extend(extra_extensions.iter().map(|e| e.to_ascii_lowercase()));
        Self {
            images_dir,
            docs_dir,
            document_extensions,
        }
    }

    /// Destination of an asset URL
    ///
    /// The file name is the slug of the whole URL path, so `/a/logo.png`
    /// and `/b/logo.png` land in `a-logo.png` and `b-logo.png`.
    pub fn destination(&self, url: &Url) -> PathBuf {
        let (stem, ext) = split_file_name(url);
        let mut slug = slugify(&stem);
        if slug.is_empty() {
            slug = "asset".to_string();
        }

        let dir = if self.document_extensions.contains(&ext) {
            &self.docs_dir
        } else {
            &self.images_dir
        };
        dir.join(format!("{}{}", slug, ext))
    }
}

impl AssetExtractor for FileAssetExtractor {
    fn extract(&self, bytes: &[u8], url: &str) -> Result<PathBuf, ExtractError> {
        let parsed = Url::parse(url).map_err(|e| ExtractError::Asset(format!("{}: {}", url, e)))?;
        let path = self.destination(&parsed);
        write_atomic_sync(&path, bytes)?;

        if path.extension().is_some_and(|e| e == "md") {
            write_extracted_markdown(&path, bytes, url)?;
        }

        Ok(path)
    }
}

/// Writes `<slug>.extracted.md`: the Markdown asset wrapped in front-matter
fn write_extracted_markdown(path: &Path, bytes: &[u8], url: &str) -> Result<(), ExtractError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();

    let front_matter = AssetFrontMatter {
        url,
        title: stem,
        source_file: file_name,
        ingestion_engine: ingestion_engine(),
    };
    let body = String::from_utf8_lossy(bytes);
    let artifact = compose_artifact(&front_matter, &body)
        .map_err(|e| ExtractError::Asset(e.to_string()))?;

    write_atomic_sync(&path.with_extension("extracted.md"), &artifact)?;
    Ok(())
}

/// Splits the decoded path into a dash-joined stem and a lowercase `.ext`
///
/// Parent directories are part of the stem; the extension comes from the
/// last segment only.
fn split_file_name(url: &Url) -> (String, String) {
    let mut segments: Vec<String> = url
        .path_segments()
        .map(|segments| {
            segments
                .filter(|segment| !segment.is_empty())
                .map(percent_decode_str)
                .collect()
        })
        .unwrap_or_default();
    let last = segments.pop().unwrap_or_default();

    let (name, ext) = match last.rfind('.') {
        Some(dot) if dot > 0 => (
            last[..dot].to_string(),
            last[dot..].to_ascii_lowercase(),
        ),
        _ => (last, String::new()),
    };

    segments.push(name);
    (segments.join("-"), ext)
}
