use crate::consolidate::merge::{consolidate, MergePolicy, MergeStats};
use crate::consolidate::MergeError;
use crate::record::{IdentityKey, Record};
use crate::storage::{read_json, write_json_atomic, TargetLayout, UnitFileStore};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;

/// What a consolidation pass did
#[derive(Debug, Clone)]
pub struct ConsolidationReport {
    pub canonical: PathBuf,
    pub backup: Option<PathBuf>,
    /// Unit files folded in
    pub unit_files: usize,
    /// Unit files skipped because they could not be read
    pub skipped_files: Vec<PathBuf>,
    pub stats: MergeStats,
    /// False when the result equalled the existing canonical file
    pub written: bool,
}

/// Merges the unit files of a target into its canonical dataset
pub struct Consolidator {
    layout: TargetLayout,
    units: UnitFileStore,
    identity: Arc<dyn IdentityKey>,
    policy: MergePolicy,
    backup: bool,
}

impl Consolidator {
    pub fn new(
        layout: TargetLayout,
        identity: Arc<dyn IdentityKey>,
        policy: MergePolicy,
        backup: bool,
    ) -> Self {
        Self {
            units: UnitFileStore::new(layout.clone()),
            layout,
            identity,
            policy,
            backup,
        }
    }

    /// Runs one consolidation pass
    ///
    /// # Errors
    ///
    /// * `MergeError::MalformedCanonical` - the existing canonical file could
    ///   not be parsed; nothing is written
    /// * `MergeError::Storage` - the temp directory could not be listed or the
    ///   result could not be written
    pub fn run(&self) -> Result<ConsolidationReport, MergeError> {
        let canonical = self.layout.canonical_file();
        let had_canonical = canonical.is_file();

        let existing: Vec<Record> = if had_canonical {
            read_json(&canonical).map_err(|source| MergeError::MalformedCanonical {
                path: canonical.clone(),
                source,
            })?
        } else {
            Vec::new()
        };

        let mut batches = Vec::new();
        let mut skipped_files = Vec::new();
        for path in self.units.list()? {
            match self.units.read(&path) {
                Ok(records) => batches.push(records),
                Err(e) => {
                    tracing::warn!("Skipping unreadable unit file {}: {}", path.display(), e);
                    skipped_files.push(path);
                }
            }
        }
        let unit_files = batches.len();

        let result = consolidate(existing.clone(), batches, self.identity.as_ref(), &self.policy);

        if result.stats.skipped_no_key > 0 {
            tracing::warn!(
                "{} record(s) had no identity key and were dropped",
                result.stats.skipped_no_key
            );
        }
        if result.stats.kept_no_key > 0 {
            tracing::warn!(
                "{} existing record(s) have no identity key and were kept as they are",
                result.stats.kept_no_key
            );
        }

        if had_canonical && result.records == existing {
            tracing::info!(
                "Canonical dataset unchanged ({} records)",
                result.records.len()
            );
            return Ok(ConsolidationReport {
                canonical,
                backup: None,
                unit_files,
                skipped_files,
                stats: result.stats,
                written: false,
            });
        }

        let backup = if had_canonical && self.backup {
            let backup = self.layout.backup_file(Local::now());
            std::fs::copy(&canonical, &backup)?;
            tracing::info!("Backed up previous dataset to {}", backup.display());
            Some(backup)
        } else {
            None
        };

        write_json_atomic(&canonical, &result.records)?;
        tracing::info!(
            "Wrote {} record(s) to {} ({} new, {} merged)",
            result.records.len(),
            canonical.display(),
            result.stats.new_keys,
            result.stats.merged
        );

        Ok(ConsolidationReport {
            canonical,
            backup,
            unit_files,
            skipped_files,
            stats: result.stats,
            written: true,
        })
    }
}
