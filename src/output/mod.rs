//! Output module: everything the crawl leaves on disk
//!
//! This module handles:
//! - The per-site directory layout
//! - Writing page artifacts atomically, with optional compression
//! - The JSON-lines audit log
//! - Markdown post-processing of extracted text
//! - The end-of-run summary

pub mod audit;
pub mod markdown;
pub mod summary;
pub mod writer;

pub use audit::{read_audit_log, AuditLog, AuditRecord};
pub use markdown::{add_table_of_contents, clean_text, enhance_markdown, heading_anchor};
pub use summary::{format_summary, generate_summary, Summary, TOP_ERRORS};
pub use writer::{compose_artifact, read_artifact, write_atomic, ArtifactWriter};

use crate::url::domain_slug;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Output errors
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Compression error: {0}")]
    Compression(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Layout of one site's directory under the data root
///
/// ```text
/// <data-dir>/<domain-slug>/
///     state.db
///     content/<slug>.md[.zst|.gz]
///     media/images/
///     media/docs/
///     migration_audit.jsonl
///     logs/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePaths {
    root: PathBuf,
}

impl SitePaths {
    /// Site directory for a seed URL under `data_dir`
    pub fn new(data_dir: &Path, seed: &Url) -> Self {
        Self {
            root: data_dir.join(domain_slug(seed)),
        }
    }

    /// Uses an existing site directory as-is
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_db(&self) -> PathBuf {
        self.root.join("state.db")
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join("content")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("media").join("images")
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.root.join("media").join("docs")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.root.join("migration_audit.jsonl")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Creates every directory of the layout
    pub async fn create_dirs(&self) -> OutputResult<()> {
        for dir in [
            self.content_dir(),
            self.images_dir(),
            self.docs_dir(),
            self.logs_dir(),
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}
