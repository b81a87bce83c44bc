//! Storage module for persisting crawl state
//!
//! This module handles all database operations for the engine, including:
//! - SQLite schema management and connection pooling
//! - URL insertion (single and batched) with validation
//! - Status transitions, retry counting and resumption queries
//! - Aggregate counts for progress and summaries

mod pool;
mod schema;
mod sqlite;

pub use pool::ConnectionPool;
pub use schema::{get_schema_version, initialize_schema};
pub use sqlite::{StateStore, BATCH_CHUNK_SIZE};

use crate::state::{UrlKind, UrlStatus};
use crate::UrlError;
use thiserror::Error;

/// Maximum stored length of `last_error`, in characters
pub const MAX_ERROR_LENGTH: usize = 500;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid URL: {0}")]
    Validation(#[from] UrlError),

    #[error("URL not found: {0}")]
    NotFound(String),

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Represents a row of the `urls` table
#[derive(Debug, Clone, PartialEq)]
pub struct UrlRecord {
    pub url: String,
    pub status: UrlStatus,
    pub kind: Option<UrlKind>,
    pub retries: u32,
    pub last_error: Option<String>,
    pub last_try: Option<String>,
    pub discovered_at: Option<String>,
}

/// Truncates an error message to [`MAX_ERROR_LENGTH`] characters
pub fn truncate_error(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_LENGTH) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_message() {
        assert_eq!(truncate_error("HTTP 404"), "HTTP 404");
    }

    #[test]
    fn test_truncate_long_message() {
        let long = "x".repeat(800);
        assert_eq!(truncate_error(&long).len(), MAX_ERROR_LENGTH);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(600);
        let truncated = truncate_error(&long);
        assert_eq!(truncated.chars().count(), MAX_ERROR_LENGTH);
    }
}
