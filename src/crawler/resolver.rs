//! DNS resolver with a time-bounded answer cache for the asset client

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

type Entries = HashMap<String, (Instant, Vec<SocketAddr>)>;

/// Resolves through the system resolver and remembers answers for `ttl`
#[derive(Debug, Clone)]
pub struct CachingResolver {
    ttl: Duration,
    entries: Arc<Mutex<Entries>>,
}

impl CachingResolver {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of hosts with a cached answer, fresh or not
    pub fn cached_hosts(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Resolves a host, serving fresh cached answers without a lookup
    pub async fn lookup(&self, host: &str) -> std::io::Result<Vec<SocketAddr>> {
        if let Some(addrs) = cached(&self.entries, host, self.ttl) {
            return Ok(addrs);
        }

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0)).await?.collect();
        tracing::trace!("Resolved {} to {} addresses", host, addrs.len());
        lock(&self.entries).insert(host.to_string(), (Instant::now(), addrs.clone()));
        Ok(addrs)
    }
}

impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.clone();
        Box::pin(async move {
            let addrs = resolver.lookup(name.as_str()).await?;
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}

fn cached(entries: &Mutex<Entries>, host: &str, ttl: Duration) -> Option<Vec<SocketAddr>> {
    let entries = lock(entries);
    match entries.get(host) {
        Some((at, addrs)) if at.elapsed() < ttl => Some(addrs.clone()),
        _ => None,
    }
}

fn lock(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_is_cached() {
        let resolver = CachingResolver::new(Duration::from_secs(300));
        let first = resolver.lookup("localhost").await.unwrap();
        assert!(!first.is_empty());
        assert_eq!(resolver.cached_hosts(), 1);

        let second = resolver.lookup("localhost").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(resolver.cached_hosts(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refreshed() {
        let resolver = CachingResolver::new(Duration::ZERO);
        resolver.lookup("127.0.0.1").await.unwrap();
        assert!(cached(&resolver.entries, "127.0.0.1", Duration::ZERO).is_none());
        resolver.lookup("127.0.0.1").await.unwrap();
        assert_eq!(resolver.cached_hosts(), 1);
    }

    #[tokio::test]
    async fn test_client_resolves_through_cache() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let resolver = CachingResolver::new(Duration::from_secs(300));
        let client = reqwest::Client::builder()
            .no_proxy()
            .dns_resolver(Arc::new(resolver.clone()))
            .build()
            .unwrap();

        let url = format!("http://localhost:{}/", server.address().port());
        let body = client.get(&url).send().await.unwrap().text().await.unwrap();
        assert_eq!(body, "ok");
        assert_eq!(resolver.cached_hosts(), 1);
    }
}
