//! File entry types and helper functions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether an entry is a plain file or a folder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    #[default]
    File,
    Folder,
}

/// Coarse media category, used by the UI to pick an icon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
    Image,
    Document,
    Music,
    Video,
}

impl MediaKind {
    /// Derives the media kind from a MIME type reported by the browser.
    ///
    /// Returns `None` for anything that doesn't fall into one of the four categories.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime.starts_with("audio/") {
            Some(Self::Music)
        } else if mime.starts_with("video/") {
            Some(Self::Video)
        } else if mime.contains("pdf") || mime.contains("document") {
            Some(Self::Document)
        } else {
            None
        }
    }
}

/// A single row of the remote listing.
///
/// `id` is unique within a snapshot. `storage_path` addresses the remote blob and is never
/// changed after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: String,
    pub name: String,
    pub size_bytes: u64,
    pub kind: EntryKind,
    pub modified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_kind: Option<MediaKind>,
    pub storage_path: String,
}

impl FileEntry {
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// Builds the blob path for a new entry: `{owner}/{id}-{name}`.
///
/// Namespacing by owner keeps two owners from colliding, and the id prefix means re-uploading
/// the same file name never overwrites another entry's blob.
pub fn storage_path_for(owner_id: &str, id: &str, name: &str) -> String {
    format!("{}/{}-{}", owner_id, id, name)
}
