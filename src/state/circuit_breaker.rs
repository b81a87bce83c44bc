//! Per-domain circuit breaker
//!
//! Counts consecutive failures per domain. Past the threshold the domain is
//! blocked for a timeout, after which one request is let through half-open.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default consecutive failures before a domain is blocked
pub const DEFAULT_THRESHOLD: u32 = 5;

/// Default block duration once the threshold is reached
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Observable state of a domain's circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected until the block expires
    Open,
    /// Block expired; the next request is a probe
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-domain failure record
#[derive(Debug, Clone, Default)]
struct DomainCircuit {
    /// Consecutive failures since the last success or probe
    failures: u32,

    /// When set, requests to the domain are rejected until this instant
    blocked_until: Option<Instant>,
}

/// Tracks consecutive failures per domain and blocks domains that keep failing
///
/// All state lives behind one lock; every operation is a short map lookup.
///
/// # Lifecycle
///
/// - `record_failure` increments the counter; reaching the threshold blocks the
///   domain for the configured timeout
/// - `should_allow` rejects while blocked; after expiry it clears the record and
///   lets one request through as a probe
/// - `record_success` resets the domain entirely
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    domains: Mutex<HashMap<String, DomainCircuit>>,
}

impl CircuitBreaker {
    /// Creates a breaker with the given failure threshold and block duration
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            timeout,
            domains: Mutex::new(HashMap::new()),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Checks whether a request to `domain` may proceed now
    pub fn should_allow(&self, domain: &str) -> bool {
        self.should_allow_at(domain, Instant::now())
    }

    /// Checks whether a request to `domain` may proceed at `now`
    ///
    /// # Returns
    ///
    /// * `false` - The domain is blocked and the block has not expired
    /// * `true` - The domain is not blocked, or the block expired (in which case
    ///   the record is cleared and this request acts as the half-open probe)
    pub fn should_allow_at(&self, domain: &str, now: Instant) -> bool {
        let mut domains = self.lock();
        let Some(entry) = domains.get_mut(domain) else {
            return true;
        };

        match entry.blocked_until {
            Some(until) if until > now => false,
            Some(_) => {
                entry.failures = 0;
                entry.blocked_until = None;
                true
            }
            None => true,
        }
    }

    /// Records a failed request against `domain`
    pub fn record_failure(&self, domain: &str) {
        self.record_failure_at(domain, Instant::now());
    }

    /// Records a failed request against `domain` at `now`
    pub fn record_failure_at(&self, domain: &str, now: Instant) {
        let mut domains = self.lock();
        let entry = domains.entry(domain.to_string()).or_default();
        entry.failures = entry.failures.saturating_add(1);

        if entry.failures >= self.threshold {
            entry.blocked_until = Some(now + self.timeout);
            tracing::warn!(
                domain,
                failures = entry.failures,
                "Circuit opened for {:?}",
                self.timeout
            );
        }
    }

    /// Records a successful request, clearing any failures and block
    pub fn record_success(&self, domain: &str) {
        let mut domains = self.lock();
        if let Some(entry) = domains.get_mut(domain) {
            entry.failures = 0;
            entry.blocked_until = None;
        }
    }

    /// Returns the derived state of `domain` without changing it
    pub fn get_state(&self, domain: &str) -> CircuitState {
        self.get_state_at(domain, Instant::now())
    }

    pub fn get_state_at(&self, domain: &str, now: Instant) -> CircuitState {
        let domains = self.lock();
        match domains.get(domain).and_then(|e| e.blocked_until) {
            Some(until) if until > now => CircuitState::Open,
            Some(_) => CircuitState::HalfOpen,
            None => CircuitState::Closed,
        }
    }

    /// Consecutive failures currently recorded for `domain`
    pub fn failures(&self, domain: &str) -> u32 {
        self.lock().get(domain).map_or(0, |e| e.failures)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DomainCircuit>> {
        self.domains
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = "ex.test";

    #[test]
    fn test_new_domain_allowed() {
        let breaker = CircuitBreaker::default();
        assert!(breaker.should_allow(DOMAIN));
        assert_eq!(breaker.get_state(DOMAIN), CircuitState::Closed);
        assert_eq!(breaker.failures(DOMAIN), 0);
    }

    #[test]
    fn test_opens_at_threshold() {
        let breaker = CircuitBreaker::default();
        let now = Instant::now();

        for _ in 0..4 {
            breaker.record_failure_at(DOMAIN, now);
        }
        assert!(breaker.should_allow_at(DOMAIN, now));
        assert_eq!(breaker.get_state_at(DOMAIN, now), CircuitState::Closed);

        breaker.record_failure_at(DOMAIN, now);
        assert!(!breaker.should_allow_at(DOMAIN, now));
        assert!(!breaker.should_allow_at(DOMAIN, now + Duration::from_secs(299)));
        assert_eq!(breaker.get_state_at(DOMAIN, now), CircuitState::Open);
    }

    #[test]
    fn test_half_open_after_timeout() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(10));
        let now = Instant::now();
        breaker.record_failure_at(DOMAIN, now);
        breaker.record_failure_at(DOMAIN, now);

        let later = now + Duration::from_secs(11);
        assert_eq!(breaker.get_state_at(DOMAIN, later), CircuitState::HalfOpen);

        // get_state does not mutate
        assert_eq!(breaker.failures(DOMAIN), 2);

        assert!(breaker.should_allow_at(DOMAIN, later));
        assert_eq!(breaker.failures(DOMAIN), 0);
        assert_eq!(breaker.get_state_at(DOMAIN, later), CircuitState::Closed);
    }

    #[test]
    fn test_probe_failure_counts_from_zero() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        let now = Instant::now();
        breaker.record_failure_at(DOMAIN, now);

        let later = now + Duration::from_secs(11);
        assert!(breaker.should_allow_at(DOMAIN, later));

        breaker.record_failure_at(DOMAIN, later);
        assert!(!breaker.should_allow_at(DOMAIN, later));
    }

    #[test]
    fn test_success_resets() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure(DOMAIN);
        breaker.record_failure(DOMAIN);
        breaker.record_success(DOMAIN);
        assert_eq!(breaker.failures(DOMAIN), 0);

        breaker.record_failure(DOMAIN);
        breaker.record_failure(DOMAIN);
        assert!(breaker.should_allow(DOMAIN));

        breaker.record_failure(DOMAIN);
        assert!(!breaker.should_allow(DOMAIN));

        breaker.record_success(DOMAIN);
        assert!(breaker.should_allow(DOMAIN));
        assert_eq!(breaker.get_state(DOMAIN), CircuitState::Closed);
    }

    #[test]
    fn test_domains_are_independent() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure("a.test");
        assert!(!breaker.should_allow("a.test"));
        assert!(breaker.should_allow("b.test"));
    }

    #[test]
    fn test_state_strings() {
        assert_eq!(CircuitState::Closed.as_str(), "closed");
        assert_eq!(CircuitState::Open.as_str(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
    }
}
