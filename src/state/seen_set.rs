//! In-run deduplication of item identifiers

use std::collections::HashSet;

/// Item identifiers already processed for the current query
///
/// Lives only as long as one crawl run. Restart safety comes from the ledger
/// and the on-disk skip-if-exists check, not from this set.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    ids: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Marks an identifier as processed; returns false if it was already present
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
