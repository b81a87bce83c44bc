//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UrlStatus` / `UrlKind`: the persisted lifecycle of every URL
//! - `CircuitBreaker`: per-domain consecutive-failure tracking

mod circuit_breaker;
mod url_state;

// Re-export main types
pub use circuit_breaker::{CircuitBreaker, CircuitState, DEFAULT_THRESHOLD, DEFAULT_TIMEOUT};
pub use url_state::{UrlKind, UrlStatus};
