//! Outbound notifications from the engine
//!
//! The engine never waits on an observer: every callback is a plain
//! synchronous notification that should return quickly. [`TracingCallback`]
//! is the default observer and turns every notification into a log line.

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{debug, info, warn};

/// Snapshot of engine counters, delivered on every supervisory tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStats {
    pub pages_completed: u64,
    pub pages_failed: u64,
    pub pages_total: u64,
    pub assets_completed: u64,
    pub assets_failed: u64,
    pub assets_total: u64,
    /// URLs waiting in both queues
    pub queue_pending: usize,
    pub seen_pages: usize,
    pub seen_assets: usize,
    /// Pages completed per second over the last measurement window
    pub pages_per_second: f64,
    pub browser_mode: bool,
    pub elapsed_seconds: f64,
}

/// One completed page, as shown in an activity feed
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    pub url: String,
    pub title: String,
    /// Name of the text extractor that produced the body
    pub engine: String,
    pub elapsed_ms: u64,
    pub size_bytes: usize,
    pub timestamp: DateTime<Utc>,
}

/// Engine lifecycle states reported through [`UiCallback::on_state_change`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Starting,
    Running,
    Paused,
    Stopping,
    Stopped,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer of engine progress
///
/// Implementations must be cheap and non-blocking; they are called from
/// worker tasks and from the supervisory loop.
pub trait UiCallback: Send + Sync {
    /// Called on every supervisory tick with fresh counters
    fn on_progress(&self, stats: &EngineStats);

    /// Called after each page is completed
    fn on_activity(&self, entry: &ActivityEntry);

    /// Called once when the engine switches to browser mode
    fn on_mode_change(&self, browser_mode: bool);

    /// Called when the seed domain's circuit state changes
    fn on_circuit_change(&self, state: &str);

    /// Called on every page failure, retried or not
    fn on_error(&self, _url: &str, _error_kind: &str, _message: &str) {}

    /// Called on engine lifecycle transitions
    fn on_state_change(
        &self,
        _state: EngineState,
        _mode: &str,
        _previous: EngineState,
        _reason: Option<&str>,
    ) {
    }
}

/// Observer that logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCallback;

impl UiCallback for TracingCallback {
    fn on_progress(&self, stats: &EngineStats) {
        debug!(
            pages = stats.pages_completed,
            pages_total = stats.pages_total,
            failed = stats.pages_failed,
            assets = stats.assets_completed,
            assets_total = stats.assets_total,
            queued = stats.queue_pending,
            "{:.1} pages/s",
            stats.pages_per_second
        );
    }

    fn on_activity(&self, entry: &ActivityEntry) {
        info!(
            engine = %entry.engine,
            ms = entry.elapsed_ms,
            bytes = entry.size_bytes,
            "Completed {} ({})",
            entry.title,
            entry.url
        );
    }

    fn on_mode_change(&self, browser_mode: bool) {
        if browser_mode {
            warn!("Hostile responses detected, switching to browser mode");
        } else {
            info!("Using stealth HTTP mode");
        }
    }

    fn on_circuit_change(&self, state: &str) {
        match state {
            "open" => warn!("Circuit open, pausing requests to the site"),
            _ => info!("Circuit {}", state),
        }
    }

    fn on_error(&self, url: &str, error_kind: &str, message: &str) {
        warn!(kind = error_kind, "Failed {}: {}", url, message);
    }

    fn on_state_change(
        &self,
        state: EngineState,
        mode: &str,
        previous: EngineState,
        reason: Option<&str>,
    ) {
        info!(
            mode,
            reason = reason.unwrap_or("-"),
            "Engine {} -> {}",
            previous,
            state
        );
    }
}
