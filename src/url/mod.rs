//! URL handling module for Sumi-Ingest
//!
//! This module provides URL normalization, scope filtering, slug derivation
//! and domain extraction.

mod domain;
mod normalize;
mod scope;
mod slug;

// Re-export main functions
pub use domain::{domain_of, domain_slug, extract_domain};
pub use normalize::{
    normalize_parsed, normalize_url, parse_http_url, percent_decode_str, validate_url,
    MAX_URL_LENGTH,
};
pub use scope::ScopeFilter;
pub use slug::{slugify, url_slug, INDEX_SLUG};
