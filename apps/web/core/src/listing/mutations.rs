//! Remote side of listing mutations: upload and delete.
//!
//! These functions only talk to the backend. The caller prepares inputs through `ListingStore`,
//! runs one of these, and commits the outcome back into the store before requesting a resync.

use log::{debug, warn};

use crate::listing::entry::FileEntry;
use crate::listing::store::RemovalPlan;
use crate::remote::{ErrorKind, RemoteError, RemoteListingClient};

/// Uploads the blob, then inserts the row.
///
/// Fails as a whole if either step fails. A blob uploaded before a failed insert stays behind
/// as an orphan; cleaning those up is outside this crate.
pub async fn create_entry<C: RemoteListingClient>(
    client: &C,
    owner_id: &str,
    entry: &FileEntry,
    blob: &[u8],
) -> Result<(), RemoteError> {
    client.upload_blob(&entry.storage_path, blob).await?;
    if let Err(e) = client.insert_row(owner_id, entry).await {
        warn!("Row insert failed after upload, blob {} is orphaned: {}", entry.storage_path, e);
        return Err(e);
    }
    debug!("Created entry {} ({} bytes)", entry.id, entry.size_bytes);
    Ok(())
}

/// Outcome of a multi-file upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchUpload {
    /// Entries created before the first failure (all of them on success).
    pub created: Vec<FileEntry>,
    /// The failure that stopped the batch, if any.
    pub error: Option<RemoteError>,
}

/// Creates entries one after another, stopping at the first failure.
pub async fn create_entries<C: RemoteListingClient>(
    client: &C,
    owner_id: &str,
    items: Vec<(FileEntry, Vec<u8>)>,
) -> BatchUpload {
    let mut outcome = BatchUpload::default();
    for (entry, blob) in items {
        match create_entry(client, owner_id, &entry, &blob).await {
            Ok(()) => outcome.created.push(entry),
            Err(e) => {
                outcome.error = Some(e);
                break;
            }
        }
    }
    outcome
}

/// Deletes the blobs, then the rows.
///
/// Row deletion is skipped if blob deletion fails. `NotFound` from either step counts as
/// success: the thing is already gone. If the row delete fails after the blobs are gone, the
/// rows are left pointing at missing blobs.
pub async fn remove_entries<C: RemoteListingClient>(client: &C, plan: &RemovalPlan) -> Result<(), RemoteError> {
    if plan.is_empty() {
        return Ok(());
    }

    if let Err(e) = client.delete_blobs(&plan.storage_paths()).await {
        if e.kind() != ErrorKind::NotFound {
            return Err(e);
        }
        debug!("Blobs already gone: {}", e);
    }

    if let Err(e) = client.delete_rows(&plan.ids()).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(
                "Row delete failed after blob delete, {} rows point at missing blobs: {}",
                plan.entries.len(),
                e
            );
            return Err(e);
        }
        debug!("Rows already gone: {}", e);
    }

    debug!("Removed {} entries", plan.entries.len());
    Ok(())
}
