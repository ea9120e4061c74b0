use crate::state::CrawlUnit;
use std::collections::HashSet;

/// Breadth-first queue of units, one wave per hierarchy depth
///
/// A unit id is accepted at most once per run, so a child listed by two
/// parents is crawled once.
#[derive(Debug, Default)]
pub struct Frontier {
    seen: HashSet<String>,
    next: Vec<CrawlUnit>,
    duplicates: usize,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a unit for the next wave; false if its id was already seen
    pub fn push(&mut self, unit: CrawlUnit) -> bool {
        if self.seen.insert(unit.id.clone()) {
            self.next.push(unit);
            true
        } else {
            self.duplicates += 1;
            false
        }
    }

    pub fn extend<I: IntoIterator<Item = CrawlUnit>>(&mut self, units: I) {
        for unit in units {
            self.push(unit);
        }
    }

    /// Takes every queued unit, leaving the frontier empty for the next depth
    pub fn take_wave(&mut self) -> Vec<CrawlUnit> {
        std::mem::take(&mut self.next)
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }

    pub fn len(&self) -> usize {
        self.next.len()
    }

    /// Distinct unit ids accepted so far
    pub fn discovered(&self) -> usize {
        self.seen.len()
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UnitKind;

    fn unit(id: &str) -> CrawlUnit {
        CrawlUnit::root(id, UnitKind::Item, format!("https://example.com/{}", id))
    }

    #[test]
    fn test_waves_drop_duplicate_ids() {
        let mut frontier = Frontier::new();
        frontier.extend([unit("a"), unit("b"), unit("a")]);
        assert_eq!(frontier.len(), 2);
        assert_eq!(frontier.duplicates(), 1);

        let wave = frontier.take_wave();
        assert_eq!(wave.len(), 2);
        assert!(frontier.is_empty());

        // Ids from earlier waves are still known
        assert!(!frontier.push(unit("b")));
        assert!(frontier.push(unit("c")));
        assert_eq!(frontier.discovered(), 3);
    }
}
