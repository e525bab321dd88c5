//! Sorting configuration and logic for file listings.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cmp::Ordering;

use crate::listing::entry::FileEntry;

// ============================================================================
// Sorting configuration
// ============================================================================

/// Column to sort files by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Name,
    Size,
    #[default]
    Modified,
}

/// Sort order (ascending or descending).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[serde(rename = "asc")]
    Ascending,
    #[default]
    #[serde(rename = "desc")]
    Descending,
}

impl SortOrder {
    pub fn flipped(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

// ============================================================================
// Sorting logic
// ============================================================================

/// Compares two names lexicographically, ignoring case.
fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Compares two entries by a single column, ascending.
pub fn compare_by(a: &FileEntry, b: &FileEntry, sort_by: SortKey) -> Ordering {
    match sort_by {
        SortKey::Name => compare_names(&a.name, &b.name),
        SortKey::Size => a.size_bytes.cmp(&b.size_bytes),
        SortKey::Modified => a.modified_at.cmp(&b.modified_at),
    }
}

/// Sorts entries by the given column and order.
///
/// The sort is stable in both directions: entries that compare equal keep their input order,
/// also when sorting descending.
pub fn sort_entries<E: Borrow<FileEntry>>(entries: &mut [E], sort_by: SortKey, sort_order: SortOrder) {
    entries.sort_by(|a, b| {
        let (a, b): (&FileEntry, &FileEntry) = (a.borrow(), b.borrow());
        sort_order.apply(compare_by(a, b, sort_by))
    });
}
