//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching robots.txt files.
//! Pages disallowed for the `sumi-ingest` agent are skipped when robots compliance is on.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache, ROBOTS_AGENT};
pub use parser::RobotsRules;
