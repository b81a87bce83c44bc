//! Configuration module for Sumi-Ingest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_ingest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("ingest.toml")).unwrap();
//! println!("Page workers: {}", config.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Compression, Config, Scope};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, apply_overrides_from, compute_config_hash, load_config,
    load_config_with_hash, ENV_DATA_DIR, ENV_MAX_WORKERS,
};
pub use validation::validate;
