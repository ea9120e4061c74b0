//! Consolidation of unit files into the canonical dataset

mod consolidator;
mod merge;

pub use consolidator::{ConsolidationReport, Consolidator};
pub use merge::{consolidate, merge_into, Consolidated, FieldPolicy, MergePolicy, MergeStats};

use crate::storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    /// The existing canonical file could not be read; it is left untouched
    #[error("Malformed canonical dataset {}: {source}", .path.display())]
    MalformedCanonical {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
