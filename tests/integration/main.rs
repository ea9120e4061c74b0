//! Integration tests for the harvest engine
//!
//! These tests use wiremock to serve a small collection → item site and run
//! the full crawl, checkpoint and consolidation cycle end-to-end.

mod common;
mod harvest_tests;
mod resume_tests;
