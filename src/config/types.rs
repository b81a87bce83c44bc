use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Ingest
///
/// Every key is optional in the TOML file; missing keys fall back to the
/// values in [`Config::default`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Root directory holding one sub-directory per ingested site
    pub data_dir: PathBuf,

    /// Number of page workers (also the in-flight fetch limit)
    pub workers: usize,

    /// Number of asset download workers
    pub asset_workers: usize,

    /// Maximum attempts per page URL before it is marked failed
    pub max_retries: u32,

    /// Total timeout for a single stealth HTTP request (seconds)
    pub timeout_seconds: f64,

    /// Minimum pause before each page fetch (seconds)
    pub request_delay: f64,

    /// Which discovered URLs are followed
    pub scope: Scope,

    /// Whether discovered assets are downloaded
    pub extract_assets: bool,

    /// Host to IP overrides applied to the browser and HTTP clients
    pub dns_overrides: BTreeMap<String, String>,

    /// Number of pooled SQLite connections
    pub db_pool_size: usize,

    /// SQLite busy timeout (seconds)
    pub db_timeout_seconds: f64,

    /// How long aggregate status counts are cached (seconds)
    pub stats_cache_ttl_seconds: f64,

    /// Artifact compression codec
    pub compression: Compression,

    /// Codec level (zstd 1-22, gzip 0-9)
    pub compression_level: i32,

    /// Additional document suffixes treated as assets (e.g. ".docx")
    pub extra_asset_extensions: Vec<String>,

    /// Honor robots.txt disallow rules
    pub respect_robots: bool,

    /// Fail pages that turn out to be CAPTCHA or bot challenges
    pub detect_captcha: bool,

    /// Browser navigation timeout (milliseconds)
    pub browser_timeout_ms: u64,

    /// Maximum concurrently open browser pages (defaults to `workers`)
    pub browser_max_pages: Option<usize>,

    /// Consecutive failures that open the circuit for a domain
    pub circuit_threshold: u32,

    /// How long an open circuit blocks a domain (seconds)
    pub circuit_timeout_seconds: f64,

    /// Lower bound for the graceful drain deadline (seconds)
    pub min_shutdown_seconds: f64,

    /// Default log level when no verbosity flag is given
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            workers: 5,
            asset_workers: 8,
            max_retries: 3,
            timeout_seconds: 30.0,
            request_delay: 1.0,
            scope: Scope::Smart,
            extract_assets: true,
            dns_overrides: BTreeMap::new(),
            db_pool_size: 5,
            db_timeout_seconds: 5.0,
            stats_cache_ttl_seconds: 5.0,
            compression: Compression::None,
            compression_level: 3,
            extra_asset_extensions: Vec::new(),
            respect_robots: true,
            detect_captcha: true,
            browser_timeout_ms: 45_000,
            browser_max_pages: None,
            circuit_threshold: 5,
            circuit_timeout_seconds: 300.0,
            min_shutdown_seconds: 30.0,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay)
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.db_timeout_seconds)
    }

    pub fn stats_cache_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.stats_cache_ttl_seconds)
    }

    pub fn circuit_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.circuit_timeout_seconds)
    }

    pub fn min_shutdown(&self) -> Duration {
        Duration::from_secs_f64(self.min_shutdown_seconds)
    }

    pub fn browser_timeout(&self) -> Duration {
        Duration::from_millis(self.browser_timeout_ms)
    }

    /// Effective browser page-concurrency cap
    pub fn browser_pages(&self) -> usize {
        self.browser_max_pages.unwrap_or(self.workers).max(1)
    }
}

/// Scope mode deciding which same-host URLs are followed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Only the seed and paths beneath it
    Strict,
    /// Everything on the seed's host
    Broad,
    /// Broad for a root seed, strict otherwise
    #[default]
    Smart,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Broad => "broad",
            Self::Smart => "smart",
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "broad" => Ok(Self::Broad),
            "smart" => Ok(Self::Smart),
            other => Err(format!("unknown scope '{}'", other)),
        }
    }
}

/// Artifact compression codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Zstd,
    Gzip,
    #[default]
    None,
}

impl Compression {
    /// File suffix appended after `.md`
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Zstd => ".md.zst",
            Self::Gzip => ".md.gz",
            Self::None => ".md",
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zstd" => Ok(Self::Zstd),
            "gzip" => Ok(Self::Gzip),
            "none" => Ok(Self::None),
            other => Err(format!("unknown compression '{}'", other)),
        }
    }
}
