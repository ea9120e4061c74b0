use crate::state::UnitStatus;
use crate::HarvestError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Level of a unit in the crawl hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Top-level list page (e.g. a league)
    Collection,
    /// Intermediate list page (e.g. a series or team index)
    Group,
    /// Detail page that yields records (e.g. a team roster)
    Item,
}

impl UnitKind {
    /// Returns true if units of this kind yield child units rather than records
    pub fn discovers_children(&self) -> bool {
        matches!(self, Self::Collection | Self::Group)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Group => "group",
            Self::Item => "item",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discrete item of crawl work at a hierarchy level
///
/// Units are created when a parent unit discovers them (or as roots from the
/// configuration). The status only moves forward; see [`UnitStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlUnit {
    pub id: String,
    pub kind: UnitKind,
    pub parent_id: Option<String>,
    pub url: String,
    status: UnitStatus,
}

impl CrawlUnit {
    /// Creates a top-level unit with no parent
    pub fn root(id: impl Into<String>, kind: UnitKind, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            parent_id: None,
            url: url.into(),
            status: UnitStatus::Pending,
        }
    }

    /// Creates a unit discovered by `parent`
    pub fn child(
        parent: &CrawlUnit,
        id: impl Into<String>,
        kind: UnitKind,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            parent_id: Some(parent.id.clone()),
            url: url.into(),
            status: UnitStatus::Pending,
        }
    }

    pub fn status(&self) -> UnitStatus {
        self.status
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Moves the unit to `next`, rejecting backwards or terminal-state moves
    pub fn transition(&mut self, next: UnitStatus) -> Result<(), HarvestError> {
        if !self.status.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                unit: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_unit() {
        let unit = CrawlUnit::root("league-1", UnitKind::Collection, "https://example.com/l/1");
        assert!(unit.is_root());
        assert_eq!(unit.status(), UnitStatus::Pending);
    }

    #[test]
    fn test_child_unit_links_parent() {
        let root = CrawlUnit::root("league-1", UnitKind::Collection, "https://example.com/l/1");
        let child = CrawlUnit::child(&root, "team-7", UnitKind::Item, "https://example.com/t/7");
        assert_eq!(child.parent_id.as_deref(), Some("league-1"));
        assert!(!child.is_root());
    }

    #[test]
    fn test_transition_forward() {
        let mut unit = CrawlUnit::root("a", UnitKind::Item, "https://example.com/a");
        unit.transition(UnitStatus::InProgress).unwrap();
        unit.transition(UnitStatus::Done).unwrap();
        assert_eq!(unit.status(), UnitStatus::Done);
    }

    #[test]
    fn test_transition_rejects_leaving_terminal() {
        let mut unit = CrawlUnit::root("a", UnitKind::Item, "https://example.com/a");
        unit.transition(UnitStatus::InProgress).unwrap();
        unit.transition(UnitStatus::Failed).unwrap();

        let err = unit.transition(UnitStatus::Done).unwrap_err();
        assert!(matches!(
            err,
            HarvestError::InvalidTransition {
                from: UnitStatus::Failed,
                to: UnitStatus::Done,
                ..
            }
        ));
        assert_eq!(unit.status(), UnitStatus::Failed);
    }

    #[test]
    fn test_discovers_children() {
        assert!(UnitKind::Collection.discovers_children());
        assert!(UnitKind::Group.discovers_children());
        assert!(!UnitKind::Item.discovers_children());
    }
}
