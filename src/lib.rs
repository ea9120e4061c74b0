//! Sumi-Harvest: a resilient, checkpointed crawl engine
//!
//! This crate implements the machinery shared by site-specific scrapers:
//! adaptive request pacing, a fallback chain of fetch strategies, proxy and
//! session health tracking, a breadth-first multi-phase crawl
//! (collection → group → item) with per-unit checkpoints, and idempotent
//! consolidation of unit files into a canonical dataset.

pub mod config;
pub mod consolidate;
pub mod crawler;
pub mod fetch;
pub mod health;
pub mod output;
pub mod pacing;
pub mod record;
pub mod shutdown;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Consolidation error: {0}")]
    Merge(#[from] consolidate::MergeError),

    #[error("Extraction error: {0}")]
    Extract(#[from] crawler::ExtractError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid state transition for unit {unit}: {from} -> {to}")]
    InvalidTransition {
        unit: String,
        from: state::UnitStatus,
        to: state::UnitStatus,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_harvest, Coordinator, Extractor, RunOptions};
pub use record::{FieldIdentity, IdentityKey, Record};
pub use shutdown::Shutdown;
pub use state::{CrawlUnit, UnitKind, UnitStatus};
