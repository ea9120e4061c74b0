use crate::config::TargetConfig;
use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const TEMP_DIR: &str = "temp";
pub const PROGRESS_FILE: &str = "scrape_progress.json";
pub const PARTIAL_SUFFIX: &str = "_partial";

/// File locations for one crawl target
///
/// ```text
/// <output-dir>/<target>/
///   <canonical>.json
///   <canonical>.<YYYYmmdd_HHMMSS>.bak.json
///   temp/
///     <unit-key>.json
///     scrape_progress.json
///     <aggregate>_partial.json
/// ```
#[derive(Debug, Clone)]
pub struct TargetLayout {
    root: PathBuf,
    canonical: String,
    aggregate: String,
}

impl TargetLayout {
    pub fn new(root: impl Into<PathBuf>, canonical: &str, aggregate: &str) -> Self {
        Self {
            root: root.into(),
            canonical: canonical.to_string(),
            aggregate: aggregate.to_string(),
        }
    }

    pub fn from_config(config: &TargetConfig) -> Self {
        Self::new(config.target_dir(), &config.canonical, config.aggregate_name())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join(TEMP_DIR)
    }

    pub fn progress_file(&self) -> PathBuf {
        self.temp_dir().join(PROGRESS_FILE)
    }

    pub fn partial_file(&self) -> PathBuf {
        self.temp_dir()
            .join(format!("{}{}.json", self.aggregate, PARTIAL_SUFFIX))
    }

    pub fn canonical_file(&self) -> PathBuf {
        self.root.join(format!("{}.json", self.canonical))
    }

    pub fn backup_file(&self, at: DateTime<Local>) -> PathBuf {
        self.root.join(format!(
            "{}.{}.bak.json",
            self.canonical,
            at.format("%Y%m%d_%H%M%S")
        ))
    }

    pub fn unit_file(&self, unit_id: &str) -> PathBuf {
        self.temp_dir().join(format!("{}.json", unit_key(unit_id)))
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.temp_dir())
    }
}

/// File stem for a unit id
///
/// Characters outside `[A-Za-z0-9_-]` become `_`. When the id had to be
/// rewritten, or the result could be mistaken for a bookkeeping file, the
/// first 8 hex chars of the id's SHA-256 are appended so distinct ids never
/// share a file.
pub fn unit_key(unit_id: &str) -> String {
    let sanitized: String = unit_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let reserved = sanitized.is_empty()
        || sanitized == PROGRESS_FILE.trim_end_matches(".json")
        || sanitized.ends_with(PARTIAL_SUFFIX);

    if sanitized == unit_id && !reserved {
        return sanitized;
    }

    let digest = Sha256::digest(unit_id.as_bytes());
    format!("{}_{}", sanitized, &hex::encode(digest)[..8])
}
