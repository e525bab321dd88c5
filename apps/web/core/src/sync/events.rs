//! Per-operation notifications broadcast by the session loop.
//!
//! The view layer turns these into toasts; the listing itself travels through `ListingUpdate`.

use serde::Serialize;

use crate::remote::RemoteError;
use crate::sync::scheduler::ConnectionStatus;

/// Notification for the UI. Serialized with a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SyncEvent {
    SessionStarted { owner_id: String },
    SessionEnded,
    /// A fetched snapshot replaced the listing.
    Synced { seq: u64, entry_count: usize },
    /// A fetch failed. `status` is the indicator after the failure.
    FetchFailed { error: RemoteError, status: ConnectionStatus },
    /// First successful fetch after one or more failures.
    Reconnected,
    Uploaded { ids: Vec<String> },
    /// `created` holds the ids uploaded before the failure in a multi-file upload.
    UploadFailed { created: Vec<String>, error: RemoteError },
    Removed { ids: Vec<String> },
    RemoveFailed { error: RemoteError },
}

impl SyncEvent {
    /// Whether the UI should show this as an error.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed { .. } | Self::UploadFailed { .. } | Self::RemoveFailed { .. }
        )
    }
}
