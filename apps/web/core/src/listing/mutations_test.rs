//! Tests for remote mutations against the in-memory backend

use super::mutations::{create_entries, create_entry, remove_entries};
use super::store::ListingStore;
use super::{EntryKind, FileEntry};
use crate::remote::{ErrorKind, InMemoryRemote, RemoteError, RemoteListingClient, RemoteOp};
use chrono::{DateTime, Utc};

fn create_test_entry(id: &str) -> FileEntry {
    FileEntry {
        id: id.to_string(),
        name: format!("{}.txt", id),
        size_bytes: 3,
        kind: EntryKind::File,
        modified_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        media_kind: None,
        storage_path: format!("alice/{}-{}.txt", id, id),
    }
}

fn store_for(entries: &[FileEntry]) -> ListingStore {
    let mut store = ListingStore::new();
    store.reset(Some("alice".to_string()));
    store.apply_snapshot(entries.to_vec(), 1);
    store
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_uploads_blob_then_inserts_row() {
    let remote = InMemoryRemote::new();
    let store = store_for(&[]);
    let entry = store.prepare_create("hello.txt", 5, None, Utc::now()).unwrap();

    create_entry(&remote, "alice", &entry, b"hello").await.unwrap();

    assert_eq!(remote.blob(&entry.storage_path), Some(b"hello".to_vec()));
    assert_eq!(remote.rows_for("alice"), vec![entry]);
}

#[tokio::test]
async fn test_create_fails_when_upload_fails() {
    let remote = InMemoryRemote::new();
    remote.fail_next(RemoteOp::UploadBlob, RemoteError::connectivity("offline"));
    let entry = create_test_entry("a");

    let err = create_entry(&remote, "alice", &entry, b"abc").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connectivity);
    // Row insert never attempted
    assert_eq!(remote.calls(RemoteOp::InsertRow), 0);
    assert!(remote.rows_for("alice").is_empty());
}

#[tokio::test]
async fn test_create_fails_as_a_whole_when_insert_fails() {
    let remote = InMemoryRemote::new();
    remote.fail_next(RemoteOp::InsertRow, RemoteError::validation("bad row"));
    let entry = create_test_entry("a");

    let err = create_entry(&remote, "alice", &entry, b"abc").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(remote.rows_for("alice").is_empty());
    // Orphan blob is left for out-of-band cleanup
    assert!(remote.has_blob(&entry.storage_path));
}

#[tokio::test]
async fn test_create_entries_stops_at_first_failure() {
    let remote = InMemoryRemote::new();
    // Second upload fails
    remote.upload_blob("warmup", b"").await.unwrap();
    let items = vec![
        (create_test_entry("a"), b"1".to_vec()),
        (create_test_entry("b"), b"2".to_vec()),
        (create_test_entry("c"), b"3".to_vec()),
    ];
    let mut conflicting = items.clone();
    conflicting[1].0.storage_path = "warmup".to_string();

    let outcome = create_entries(&remote, "alice", conflicting).await;
    assert_eq!(outcome.created.len(), 1);
    assert_eq!(outcome.created[0].id, "a");
    assert_eq!(outcome.error.map(|e| e.kind()), Some(ErrorKind::Conflict));
    // "c" never attempted
    assert_eq!(remote.rows_for("alice").len(), 1);
}

#[tokio::test]
async fn test_create_entries_all_succeed() {
    let remote = InMemoryRemote::new();
    let items = vec![
        (create_test_entry("a"), b"1".to_vec()),
        (create_test_entry("b"), b"2".to_vec()),
    ];

    let outcome = create_entries(&remote, "alice", items).await;
    assert_eq!(outcome.created.len(), 2);
    assert!(outcome.error.is_none());
}

// ============================================================================
// Remove
// ============================================================================

#[tokio::test]
async fn test_remove_deletes_blob_and_row() {
    let entry = create_test_entry("a");
    let remote = InMemoryRemote::with_entries("alice", vec![entry.clone()]);
    let store = store_for(&[entry.clone()]);

    let plan = store.plan_removal(&["a".to_string()]);
    remove_entries(&remote, &plan).await.unwrap();

    assert!(remote.rows_for("alice").is_empty());
    assert!(!remote.has_blob(&entry.storage_path));
}

#[tokio::test]
async fn test_remove_missing_id_is_a_no_op_success() {
    let entry = create_test_entry("a");
    let remote = InMemoryRemote::with_entries("alice", vec![entry.clone()]);
    let store = store_for(&[entry]);

    let plan = store.plan_removal(&["ghost".to_string()]);
    assert!(plan.is_empty());
    remove_entries(&remote, &plan).await.unwrap();

    // No remote calls, collection unchanged
    assert_eq!(remote.calls(RemoteOp::DeleteBlobs), 0);
    assert_eq!(remote.calls(RemoteOp::DeleteRows), 0);
    assert_eq!(store.entries().len(), 1);
}

#[tokio::test]
async fn test_remove_skips_rows_when_blob_delete_fails() {
    let entry = create_test_entry("a");
    let remote = InMemoryRemote::with_entries("alice", vec![entry.clone()]);
    remote.fail_next(RemoteOp::DeleteBlobs, RemoteError::permission("read-only"));
    let store = store_for(&[entry]);

    let plan = store.plan_removal(&["a".to_string()]);
    let err = remove_entries(&remote, &plan).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Permission);
    assert_eq!(remote.calls(RemoteOp::DeleteRows), 0);
    assert_eq!(remote.rows_for("alice").len(), 1);
}

#[tokio::test]
async fn test_remove_treats_not_found_as_success() {
    let entry = create_test_entry("a");
    let remote = InMemoryRemote::with_entries("alice", vec![entry.clone()]);
    remote.fail_next(
        RemoteOp::DeleteBlobs,
        RemoteError::NotFound {
            target: entry.storage_path.clone(),
        },
    );
    let store = store_for(&[entry]);

    let plan = store.plan_removal(&["a".to_string()]);
    remove_entries(&remote, &plan).await.unwrap();
    assert!(remote.rows_for("alice").is_empty());
}

#[tokio::test]
async fn test_row_delete_failure_after_blob_delete_leaves_orphan_row() {
    let entry = create_test_entry("a");
    let remote = InMemoryRemote::with_entries("alice", vec![entry.clone()]);
    remote.fail_next(RemoteOp::DeleteRows, RemoteError::connectivity("dropped"));
    let store = store_for(&[entry.clone()]);

    let plan = store.plan_removal(&["a".to_string()]);
    let err = remove_entries(&remote, &plan).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connectivity);
    assert!(!remote.has_blob(&entry.storage_path));
    assert_eq!(remote.rows_for("alice").len(), 1);
}

#[tokio::test]
async fn test_remove_many() {
    let entries = vec![create_test_entry("a"), create_test_entry("b"), create_test_entry("c")];
    let remote = InMemoryRemote::with_entries("alice", entries.clone());
    let store = store_for(&entries);

    let plan = store.plan_removal(&["a".to_string(), "c".to_string()]);
    remove_entries(&remote, &plan).await.unwrap();

    let left = remote.fetch_all("alice").await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, "b");
    // One batched call per step
    assert_eq!(remote.calls(RemoteOp::DeleteBlobs), 1);
    assert_eq!(remote.calls(RemoteOp::DeleteRows), 1);
}
