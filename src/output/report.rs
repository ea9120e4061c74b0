use crate::state::UnitKind;
use chrono::{DateTime, Utc};

/// A unit that ended the run failed
#[derive(Debug, Clone, PartialEq)]
pub struct FailedUnit {
    pub id: String,
    pub kind: UnitKind,
    pub url: String,
    pub reason: String,
}

/// Outcome counts of one crawl run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Units that reached `done`
    pub succeeded: usize,

    /// Units that reached `failed`, in completion order
    pub failed: Vec<FailedUnit>,

    /// Item units skipped because the checkpoint already had them
    pub skipped: usize,

    /// Units abandoned or never started because of shutdown
    pub cancelled: usize,

    /// Distinct unit ids seen, roots included
    pub discovered: usize,

    /// Records written to unit files this run
    pub records: usize,

    /// Network requests sent
    pub fetch_attempts: u64,

    /// Breadth-first waves processed
    pub waves: usize,

    /// The run stopped early because shutdown was requested
    pub interrupted: bool,
}

impl RunReport {
    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.id.as_str()).collect()
    }

    /// True if the run was not interrupted
    pub fn is_complete(&self) -> bool {
        !self.interrupted
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }
}
