//! View projection: sort, filter, and selection flags over the current listing.
//!
//! Everything here is a pure function of its inputs. The UI recomputes the projection on every
//! change to the collection, the view state, or the selection.

use serde::{Deserialize, Serialize};

use crate::listing::entry::FileEntry;
use crate::listing::selection::SelectionSet;
use crate::listing::sorting::{SortKey, SortOrder, sort_entries};

/// Transient, UI-owned view settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
    pub search_term: String,
}

impl ViewState {
    /// Applies a click on a column header.
    ///
    /// Clicking the active column flips the order; clicking another column switches to it,
    /// ascending.
    pub fn toggle_sort(&mut self, key: SortKey) {
        if self.sort_key == key {
            self.sort_order = self.sort_order.flipped();
        } else {
            self.sort_key = key;
            self.sort_order = SortOrder::Ascending;
        }
    }
}

/// One rendered row: an entry plus its selection flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRow<'a> {
    pub entry: &'a FileEntry,
    pub selected: bool,
}

/// Sorted view over a listing. Filtering and selection flags are applied lazily by `rows`.
pub struct Projection<'a> {
    sorted: Vec<&'a FileEntry>,
    needle: String,
    selection: &'a SelectionSet,
}

impl<'a> Projection<'a> {
    /// Iterates the visible rows in display order. Can be called any number of times.
    pub fn rows(&self) -> impl Iterator<Item = ViewRow<'a>> + '_ {
        self.sorted
            .iter()
            .copied()
            .filter(|entry| self.needle.is_empty() || entry.name.to_lowercase().contains(&self.needle))
            .map(|entry| ViewRow {
                entry,
                selected: self.selection.contains(&entry.id),
            })
    }

    /// Number of rows that pass the search filter.
    pub fn visible_count(&self) -> usize {
        self.rows().count()
    }
}

/// Builds the projection: (1) stable sort, (2) case-insensitive name filter, (3) selection flags.
pub fn project<'a>(entries: &'a [FileEntry], view: &ViewState, selection: &'a SelectionSet) -> Projection<'a> {
    let mut sorted: Vec<&FileEntry> = entries.iter().collect();
    sort_entries(&mut sorted, view.sort_key, view.sort_order);

    Projection {
        sorted,
        needle: view.search_term.to_lowercase(),
        selection,
    }
}
