//! Listing store: the canonical in-memory collection and selection.
//!
//! The store is the only writer of the collection and of the selection set. Remote calls happen
//! elsewhere (see `mutations`); the store only prepares the inputs and commits the outcomes.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::listing::entry::{EntryKind, FileEntry, MediaKind, storage_path_for};
use crate::listing::selection::{ClickMode, SelectionSet};

/// Result of applying a fetched snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// The snapshot replaced the collection. `pruned` selected ids vanished with it.
    Applied { pruned: usize },
    /// An equal or newer snapshot was already applied.
    Stale,
}

/// Storage usage summary for the current listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListingStats {
    pub file_count: usize,
    pub total_bytes: u64,
    /// Share of the quota in use, 0-100.
    pub usage_percent: f64,
}

/// Entries resolved for a delete request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalPlan {
    /// Entries found in the current collection, in request order.
    pub entries: Vec<FileEntry>,
    /// Requested ids that aren't in the collection. Removing them is a no-op.
    pub missing: Vec<String>,
}

impl RemovalPlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn storage_paths(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.storage_path.clone()).collect()
    }
}

/// Canonical holder of the current listing for one session.
#[derive(Debug, Default)]
pub struct ListingStore {
    owner_id: Option<String>,
    entries: Arc<[FileEntry]>,
    selection: SelectionSet,
    /// Sequence number of the last applied snapshot.
    applied_seq: Option<u64>,
}

impl ListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears everything and binds the store to `owner_id` (or to nobody, on sign-out).
    pub fn reset(&mut self, owner_id: Option<String>) {
        self.owner_id = owner_id;
        self.entries = Arc::from(Vec::new());
        self.selection.clear();
        self.applied_seq = None;
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Cheap shared handle to the current collection.
    pub fn shared_entries(&self) -> Arc<[FileEntry]> {
        Arc::clone(&self.entries)
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn applied_seq(&self) -> Option<u64> {
        self.applied_seq
    }

    pub fn get(&self, id: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    // ========================================
    // Snapshots
    // ========================================

    /// Replaces the collection wholesale if `seq` is not older than the last applied snapshot.
    ///
    /// Duplicate ids in the fetched rows keep their first occurrence. Selected ids that are no
    /// longer present are pruned.
    pub fn apply_snapshot(&mut self, entries: Vec<FileEntry>, seq: u64) -> SnapshotOutcome {
        if let Some(applied) = self.applied_seq
            && seq < applied
        {
            debug!("Discarding stale snapshot seq={} (applied seq={})", seq, applied);
            return SnapshotOutcome::Stale;
        }

        let mut seen = HashSet::with_capacity(entries.len());
        let mut unique = Vec::with_capacity(entries.len());
        for entry in entries {
            if seen.insert(entry.id.clone()) {
                unique.push(entry);
            } else {
                warn!("Snapshot seq={} contains duplicate id {}, keeping the first", seq, entry.id);
            }
        }

        let pruned = self.selection.retain(|id| seen.contains(id));
        if pruned > 0 {
            debug!("Pruned {} selected ids missing from snapshot seq={}", pruned, seq);
        }

        self.entries = Arc::from(unique);
        self.applied_seq = Some(seq);
        SnapshotOutcome::Applied { pruned }
    }

    // ========================================
    // Mutations
    // ========================================

    /// Builds the entry for a new upload: fresh id, owner-namespaced storage path.
    ///
    /// Returns `None` when no session is active.
    pub fn prepare_create(
        &self,
        name: &str,
        size_bytes: u64,
        mime: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<FileEntry> {
        let owner_id = self.owner_id.as_deref()?;
        let id = Uuid::new_v4().to_string();
        Some(FileEntry {
            storage_path: storage_path_for(owner_id, &id, name),
            id,
            name: name.to_string(),
            size_bytes,
            kind: EntryKind::File,
            modified_at: now,
            media_kind: mime.and_then(MediaKind::from_mime),
        })
    }

    /// Resolves ids against the current collection. Ids that aren't present end up in `missing`.
    pub fn plan_removal(&self, ids: &[String]) -> RemovalPlan {
        let mut plan = RemovalPlan::default();
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match self.get(id) {
                Some(entry) => plan.entries.push(entry.clone()),
                None => plan.missing.push(id.clone()),
            }
        }
        plan
    }

    /// Records a successful delete: the ids leave the selection.
    ///
    /// The collection itself is left alone; the resync that follows brings the new truth.
    pub fn commit_removal(&mut self, plan: &RemovalPlan) {
        for entry in &plan.entries {
            self.selection.remove(&entry.id);
        }
    }

    // ========================================
    // Selection
    // ========================================

    /// Applies a row click. Clicks on ids that aren't in the collection are ignored.
    pub fn click(&mut self, id: &str, mode: ClickMode) -> bool {
        if self.get(id).is_none() {
            debug!("Ignoring click on unknown id {}", id);
            return false;
        }
        self.selection = self.selection.clicked(id, mode);
        true
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // ========================================
    // Statistics
    // ========================================

    /// Summarizes the listing against `quota_bytes` (usage capped at 100%).
    pub fn stats(&self, quota_bytes: u64) -> ListingStats {
        let total_bytes: u64 = self.entries.iter().map(|e| e.size_bytes).sum();
        let usage_percent = if quota_bytes == 0 {
            0.0
        } else {
            (total_bytes as f64 / quota_bytes as f64 * 100.0).min(100.0)
        };
        ListingStats {
            file_count: self.entries.len(),
            total_bytes,
            usage_percent,
        }
    }
}
