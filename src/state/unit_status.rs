/// Unit status definitions for tracking crawl progress
///
/// A unit moves forward only: pending → in_progress → {done, failed}.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current status of a crawl unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    // ===== Active States =====
    /// Unit has been discovered but not yet picked up by a worker
    Pending,

    /// Unit is being fetched and extracted
    InProgress,

    // ===== Terminal States =====
    /// Unit was fetched and extracted (possibly with zero records)
    Done,

    /// Fetch exhausted every strategy, or extraction/persistence failed
    Failed,
}

impl UnitStatus {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if this is an active state (unit may still be processed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: UnitStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Done)
                | (Self::InProgress, Self::Failed)
        )
    }

    /// Converts the status to its persisted string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its persisted string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible unit statuses
    pub fn all_states() -> Vec<Self> {
        vec![Self::Pending, Self::InProgress, Self::Done, Self::Failed]
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
