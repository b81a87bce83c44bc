//! Append-only JSON-lines audit log of finished pages

use crate::output::OutputResult;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One line of `migration_audit.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AuditRecord {
    Completed {
        url: String,
        title: String,
        path: String,
        assets: Vec<String>,
    },
    Failed {
        url: String,
        status: &'static str,
        error: String,
        retries: u32,
    },
}

impl AuditRecord {
    pub fn failed(url: &str, error: &str, retries: u32) -> Self {
        Self::Failed {
            url: url.to_string(),
            status: "failed",
            error: error.to_string(),
            retries,
        }
    }
}

/// Serializes appends to the audit file
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record as a single line
    pub async fn append(&self, record: &AuditRecord) -> OutputResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Reads every line of an audit log; a missing file reads as empty
pub async fn read_audit_log(path: &Path) -> OutputResult<Vec<serde_json::Value>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Into::into))
        .collect()
}
