//! File listing module - entries, store, mutations, sorting, projection, selection.

pub(crate) mod entry;
pub(crate) mod mutations;
pub(crate) mod projection;
pub(crate) mod selection;
pub(crate) mod sorting;
pub(crate) mod store;

pub use entry::{EntryKind, FileEntry, MediaKind, storage_path_for};
pub use mutations::{BatchUpload, create_entries, create_entry, remove_entries};
pub use projection::{Projection, ViewRow, ViewState, project};
pub use selection::{ClickMode, SelectionSet};
pub use sorting::{SortKey, SortOrder, compare_by, sort_entries};
pub use store::{ListingStats, ListingStore, RemovalPlan, SnapshotOutcome};

#[cfg(test)]
mod mutations_test;
