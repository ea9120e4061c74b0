//! Fetch client chain
//!
//! This module handles every network request the crawl makes:
//! - An ordered chain of strategies (session → proxy → direct)
//! - Bounded in-place retries with exponential backoff
//! - Classification of rate limits, block pages and HTTP errors
//! - Outcome reporting to the pacing controller and health tracker

mod chain;
mod detection;
mod error;
mod http;
mod session;
mod strategy;

pub use chain::{backoff_delay, FetchChain, FetchResult};
pub use detection::BlockDetector;
pub use error::{BlockReason, FetchError};
pub use http::{build_http_client, fetch_page, DirectStrategy, ProxyStrategy};
pub use session::{
    BrowserSession, CookieSessionBackend, SessionBackend, SessionLease, SessionPool,
    SessionStrategy,
};
pub use strategy::{Attempt, FetchStrategy, RawPage, StrategyKind};
