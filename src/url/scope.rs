use crate::config::Scope;
use crate::url::normalize::parse_http_url;
use crate::UrlError;
use url::Url;

/// Decides which discovered URLs belong to the crawl
///
/// Every followed URL must share the seed's host (and port). On top of that,
/// the scope mode narrows the set:
///
/// - `Broad` follows everything on the host
/// - `Strict` follows the seed itself and paths beneath it, where "beneath"
///   means the seed path followed by `/` (so `/docs` never matches `/docs-old`)
/// - `Smart` acts as `Broad` when the seed has an empty or `/` path and as
///   `Strict` otherwise
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    seed: Url,
    mode: Scope,
    strict: bool,
    seed_path: String,
}

impl ScopeFilter {
    /// Creates a scope filter around a seed URL
    pub fn new(seed: &str, mode: Scope) -> Result<Self, UrlError> {
        let seed = parse_http_url(seed)?;
        let seed_path = seed.path().trim_end_matches('/').to_string();

        let strict = match mode {
            Scope::Strict => true,
            Scope::Broad => false,
            Scope::Smart => !seed_path.is_empty(),
        };

        Ok(Self {
            seed,
            mode,
            strict,
            seed_path,
        })
    }

    pub fn seed(&self) -> &Url {
        &self.seed
    }

    pub fn mode(&self) -> Scope {
        self.mode
    }

    /// Whether the filter applies prefix matching after the host check
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Returns true when `url` has the seed's host and port
    pub fn same_host(&self, url: &Url) -> bool {
        url.host_str().map(str::to_ascii_lowercase)
            == self.seed.host_str().map(str::to_ascii_lowercase)
            && url.port_or_known_default() == self.seed.port_or_known_default()
    }

    /// Returns true when `url` should be followed
    pub fn should_follow(&self, url: &Url) -> bool {
        if !self.same_host(url) {
            return false;
        }

        if !self.strict {
            return true;
        }

        let path = url.path();
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };

        if self.seed_path.is_empty() {
            return true;
        }

        path == self.seed_path
            || path
                .strip_prefix(self.seed_path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}
