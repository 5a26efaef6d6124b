use crate::error::Result;
use crate::storage::{DuplicateGroups, Store};

/// Totals over the duplicate groups under a prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateSummary {
    pub groups: usize,
    pub files: usize,
    /// Bytes that would be freed by keeping one copy per group.
    pub wasted_bytes: u64,
}

/// Read-only view of the duplicate content in a store.
pub struct DuplicateFinder<'a> {
    store: &'a Store,
}

impl<'a> DuplicateFinder<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn groups(&self, prefix: &str) -> DuplicateGroups<'a> {
        self.store.find_duplicates(prefix)
    }

    pub fn summary(&self, prefix: &str) -> Result<DuplicateSummary> {
        let mut summary = DuplicateSummary::default();
        for group in self.groups(prefix) {
            let group = group?;
            let size = group
                .first()
                .and_then(|r| r.blob.as_ref())
                .map_or(0, |b| b.size);
            summary.groups += 1;
            summary.files += group.len();
            summary.wasted_bytes += size * (group.len() as u64 - 1);
        }
        Ok(summary)
    }
}
