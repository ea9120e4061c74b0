//! Storage module for persisting crawl progress
//!
//! This module handles all on-disk state of a crawl target, including:
//! - Atomic JSON writes (temp file + rename)
//! - Per-unit record files
//! - The progress checkpoint and partial aggregate
//! - Path layout of a target directory

mod atomic;
mod checkpoint;
mod layout;
mod unit_files;

pub use atomic::{read_json, write_json_atomic};
pub use checkpoint::{CheckpointStore, CompletedSet, Progress};
pub use layout::{unit_key, TargetLayout, PROGRESS_FILE, TEMP_DIR};
pub use unit_files::UnitFileStore;

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
