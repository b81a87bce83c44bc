//! URL status and kind definitions for the persistent crawl state
//!
//! This module defines the lifecycle states a URL moves through and the two
//! kinds of work the engine handles.
use std::fmt;

/// Represents the persisted status of a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlStatus {
    /// Waiting to be processed (or to be retried)
    Pending,

    /// Seen but not yet scheduled
    Discovered,

    /// Fetched, extracted and written
    Completed,

    /// Permanently failed or out of retries
    Failed,
}

impl UrlStatus {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Discovered => "discovered",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "discovered" => Some(Self::Discovered),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all() -> [Self; 4] {
        [
            Self::Pending,
            Self::Discovered,
            Self::Completed,
            Self::Failed,
        ]
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Which worker pool handles a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlKind {
    /// HTML page: fetched, extracted and written as Markdown
    Page,

    /// Binary resource downloaded as-is
    Asset,
}

impl UrlKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Asset => "asset",
        }
    }

    /// Parses a kind from the `type` column
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "page" => Some(Self::Page),
            "asset" => Some(Self::Asset),
            _ => None,
        }
    }
}

impl fmt::Display for UrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}
