//! End-to-end crawl scenarios against wiremock servers

mod common;
mod crawl_tests;
mod failure_tests;
mod shutdown_tests;
