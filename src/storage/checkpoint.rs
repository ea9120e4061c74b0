use crate::record::Record;
use crate::storage::atomic::{read_json, write_json_atomic};
use crate::storage::layout::TargetLayout;
use crate::storage::StorageResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio::sync::Mutex;

/// Contents of `temp/scrape_progress.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub completed_ids: BTreeSet<String>,
    /// Completed units that produced no records because they failed
    #[serde(default)]
    pub failed_ids: BTreeSet<String>,
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_records: u64,
    #[serde(default)]
    pub files_created: u64,
    #[serde(default)]
    pub config_hash: Option<String>,
}

/// Units a run may skip
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletedSet {
    ids: BTreeSet<String>,
    failed: BTreeSet<String>,
}

impl CompletedSet {
    pub fn contains(&self, unit_id: &str) -> bool {
        self.ids.contains(unit_id)
    }

    pub fn is_failed(&self, unit_id: &str) -> bool {
        self.failed.contains(unit_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn failed_len(&self) -> usize {
        self.failed.len()
    }
}

impl From<&Progress> for CompletedSet {
    fn from(progress: &Progress) -> Self {
        Self {
            ids: progress.completed_ids.clone(),
            failed: progress.failed_ids.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct CheckpointState {
    progress: Progress,
    aggregate: Vec<Record>,
}

/// Progress file and partial aggregate for one target
///
/// Both files are rewritten in full after every unit, so a failed write is
/// repaired by the next successful save.
#[derive(Debug)]
pub struct CheckpointStore {
    layout: TargetLayout,
    config_hash: Option<String>,
    state: Mutex<CheckpointState>,
}

impl CheckpointStore {
    pub fn new(layout: TargetLayout, config_hash: Option<String>) -> Self {
        Self {
            layout,
            config_hash,
            state: Mutex::new(CheckpointState::default()),
        }
    }

    /// Loads any existing checkpoint and returns the ids that can be skipped
    pub async fn load(&self) -> StorageResult<CompletedSet> {
        let mut state = self.state.lock().await;

        let progress_path = self.layout.progress_file();
        let progress: Progress = if progress_path.is_file() {
            read_json(&progress_path)?
        } else {
            Progress::default()
        };

        if let (Some(saved), Some(current)) = (&progress.config_hash, &self.config_hash) {
            if saved != current {
                tracing::warn!(
                    "Configuration changed since the checkpoint was written; resuming anyway"
                );
            }
        }

        let partial_path = self.layout.partial_file();
        let aggregate = if partial_path.is_file() {
            match read_json::<Vec<Record>>(&partial_path) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!("Ignoring unreadable {}: {}", partial_path.display(), e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        if !progress.completed_ids.is_empty() {
            tracing::info!(
                "Resuming: {} unit(s) already completed ({} failed), {} record(s) so far",
                progress.completed_ids.len(),
                progress.failed_ids.len(),
                progress.total_records
            );
        }

        let completed = CompletedSet::from(&progress);
        state.progress = progress;
        state.aggregate = aggregate;
        Ok(completed)
    }

    /// Records a finished unit and rewrites both checkpoint files
    ///
    /// The unit file must already be on disk.
    pub async fn save(&self, unit_id: &str, records: &[Record], failed: bool) -> StorageResult<()> {
        let mut state = self.state.lock().await;

        state.progress.completed_ids.insert(unit_id.to_string());
        if failed {
            state.progress.failed_ids.insert(unit_id.to_string());
        } else {
            state.progress.failed_ids.remove(unit_id);
        }
        state.progress.total_records += records.len() as u64;
        state.progress.files_created += 1;
        state.progress.last_update = Some(Utc::now());
        state.progress.config_hash = self.config_hash.clone();
        state.aggregate.extend_from_slice(records);

        self.layout.ensure_dirs()?;
        write_json_atomic(&self.layout.partial_file(), &state.aggregate)?;
        write_json_atomic(&self.layout.progress_file(), &state.progress)?;
        Ok(())
    }

    /// Drops failed units from the completed set so they are attempted again
    pub async fn forget_failed(&self) -> CompletedSet {
        let mut state = self.state.lock().await;
        let failed = std::mem::take(&mut state.progress.failed_ids);
        for id in &failed {
            state.progress.completed_ids.remove(id);
        }
        if !failed.is_empty() {
            tracing::info!("Retrying {} previously failed unit(s)", failed.len());
        }
        CompletedSet::from(&state.progress)
    }

    /// Deletes the progress and partial files and resets in-memory state
    pub async fn clear(&self) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        for path in [self.layout.progress_file(), self.layout.partial_file()] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        *state = CheckpointState::default();
        Ok(())
    }

    pub async fn progress(&self) -> Progress {
        self.state.lock().await.progress.clone()
    }

    pub fn layout(&self) -> &TargetLayout {
        &self.layout
    }
}
