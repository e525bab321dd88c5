//! Selection set and click semantics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a click on a row affects the selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ClickMode {
    /// Plain click: the clicked row becomes the only selected row.
    #[default]
    Replace,
    /// Ctrl/Cmd click: toggles the clicked row, keeping the rest.
    Toggle,
}

/// Set of selected entry ids.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct SelectionSet {
    ids: BTreeSet<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Returns the selection that results from clicking `id`. Does not modify `self`.
    pub fn clicked(&self, id: &str, mode: ClickMode) -> Self {
        match mode {
            ClickMode::Replace => Self::from_iter([id.to_string()]),
            ClickMode::Toggle => {
                let mut next = self.clone();
                if !next.ids.remove(id) {
                    next.ids.insert(id.to_string());
                }
                next
            }
        }
    }

    /// Drops every id for which `keep` returns false. Returns how many were dropped.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.ids.len();
        self.ids.retain(|id| keep(id));
        before - self.ids.len()
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        self.ids.remove(id)
    }

    pub(crate) fn clear(&mut self) {
        self.ids.clear();
    }
}

impl FromIterator<String> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
