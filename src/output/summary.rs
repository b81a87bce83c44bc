//! End-of-run summary
//!
//! Built from the state store after the workers have exited, and rendered as
//! Markdown for the terminal.

use crate::state::UrlStatus;
use crate::storage::{StateStore, StorageResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Number of error groups reported
pub const TOP_ERRORS: usize = 5;

/// Outcome of a crawl, as recorded in the state store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub seed: String,
    pub site_dir: PathBuf,
    /// Row count per status
    pub status_counts: BTreeMap<String, i64>,
    /// Row count per (kind, status)
    pub kind_counts: BTreeMap<(String, String), i64>,
    /// Most frequent `last_error` values among failed URLs
    pub top_errors: Vec<(String, i64)>,
    /// Wall-clock duration of the run, when it was a run
    pub elapsed_seconds: Option<f64>,
    pub browser_mode: bool,
}

impl Summary {
    pub fn count(&self, status: UrlStatus) -> i64 {
        self.status_counts
            .get(status.to_db_string())
            .copied()
            .unwrap_or(0)
    }

    pub fn count_kind(&self, status: UrlStatus, kind: &str) -> i64 {
        self.kind_counts
            .get(&(kind.to_string(), status.to_db_string().to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> i64 {
        self.status_counts.values().sum()
    }

    /// Share of URLs completed, in percent
    pub fn completion_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.count(UrlStatus::Completed) as f64 / total as f64 * 100.0
        }
    }
}

/// Reads counts and the top error groups from the state store
pub async fn generate_summary(
    store: &StateStore,
    seed: &str,
    site_dir: &Path,
) -> StorageResult<Summary> {
    Ok(Summary {
        seed: seed.to_string(),
        site_dir: site_dir.to_path_buf(),
        status_counts: store.get_stats(true).await?,
        kind_counts: store.get_kind_stats().await?,
        top_errors: store.top_errors(TOP_ERRORS).await?,
        elapsed_seconds: None,
        browser_mode: false,
    })
}

/// Formats a summary as Markdown
pub fn format_summary(summary: &Summary) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Ingest Summary\n\n");
    md.push_str(&format!("- **Seed**: {}\n", summary.seed));
    md.push_str(&format!("- **Output**: {}\n", summary.site_dir.display()));
    if let Some(elapsed) = summary.elapsed_seconds {
        md.push_str(&format!(
            "- **Duration**: {:.1} seconds ({:.2} minutes)\n",
            elapsed,
            elapsed / 60.0
        ));
    }
    md.push_str(&format!(
        "- **Fetch mode**: {}\n\n",
        if summary.browser_mode { "browser" } else { "stealth" }
    ));

    md.push_str("## URLs by Status\n\n");
    md.push_str("| Status | Pages | Assets | Total |\n");
    md.push_str("|--------|-------|--------|-------|\n");
    for status in UrlStatus::all() {
        md.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            status,
            summary.count_kind(status, "page"),
            summary.count_kind(status, "asset"),
            summary.count(status)
        ));
    }
    md.push_str(&format!(
        "\n**Total**: {} URLs, {:.2}% completed\n\n",
        summary.total(),
        summary.completion_rate()
    ));

    if !summary.top_errors.is_empty() {
        md.push_str("## Top Errors\n\n");
        md.push_str("| Error | Count |\n");
        md.push_str("|-------|-------|\n");
        for (error, count) in &summary.top_errors {
            md.push_str(&format!("| {} | {} |\n", error.replace('|', "\\|"), count));
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UrlKind;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> StateStore {
        let store = StateStore::open(
            &dir.path().join("state.db"),
            2,
            std::time::Duration::from_secs(5),
            std::time::Duration::ZERO,
        )
        .unwrap();
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_generate_summary() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store
            .add_url("https://ex.test/", UrlStatus::Completed, UrlKind::Page)
            .await
            .unwrap();
        store
            .add_url("https://ex.test/img.png", UrlStatus::Completed, UrlKind::Asset)
            .await
            .unwrap();
        for route in ["a", "b"] {
            let url = format!("https://ex.test/{}", route);
            store.add_url(&url, UrlStatus::Pending, UrlKind::Page).await.unwrap();
            store
                .update_status(&url, UrlStatus::Failed, Some("HTTP 404"))
                .await
                .unwrap();
        }

        let summary = generate_summary(&store, "https://ex.test/", dir.path())
            .await
            .unwrap();

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.count(UrlStatus::Completed), 2);
        assert_eq!(summary.count_kind(UrlStatus::Completed, "asset"), 1);
        assert_eq!(summary.count(UrlStatus::Failed), 2);
        assert_eq!(summary.top_errors, vec![("HTTP 404".to_string(), 2)]);
        assert!((summary.completion_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_format_summary() {
        let mut summary = Summary {
            seed: "https://ex.test/".to_string(),
            elapsed_seconds: Some(90.0),
            top_errors: vec![("HTTP 500 | upstream".to_string(), 3)],
            ..Summary::default()
        };
        summary.status_counts.insert("completed".to_string(), 7);
        summary.status_counts.insert("failed".to_string(), 3);
        summary
            .kind_counts
            .insert(("page".to_string(), "completed".to_string()), 7);

        let md = format_summary(&summary);
        assert!(md.starts_with("# Sumi-Ingest Summary"));
        assert!(md.contains("- **Seed**: https://ex.test/"));
        assert!(md.contains("| completed | 7 | 0 | 7 |"));
        assert!(md.contains("**Total**: 10 URLs, 70.00% completed"));
        assert!(md.contains("## Top Errors"));
        assert!(md.contains("| HTTP 500 \\| upstream | 3 |"));
    }

    #[test]
    fn test_format_without_errors() {
        let md = format_summary(&Summary::default());
        assert!(!md.contains("Top Errors"));
        assert!(md.contains("**Total**: 0 URLs, 0.00% completed"));
    }
}
