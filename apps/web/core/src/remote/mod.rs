//! Remote listing client trait for abstracting the storage backend.
//!
//! The backend is an external service with a row store (one row per file) and a blob store
//! (the file contents). This module provides the `RemoteListingClient` trait plus an in-memory
//! implementation used by tests and demos.

mod errors;
mod in_memory;

pub use errors::{ErrorKind, RemoteError};
pub use in_memory::{InMemoryRemote, RemoteOp};

use std::future::Future;

use crate::listing::FileEntry;

/// Trait for the remote row and blob store.
///
/// Every async method is a suspension point of the sync loop. Implementations classify their
/// failures into `RemoteError` variants; the loop never sees transport errors directly.
pub trait RemoteListingClient: Send + Sync + 'static {
    /// Fetches every row owned by `owner_id`. Order is irrelevant.
    ///
    /// Fails with `Connectivity` or `Permission`.
    fn fetch_all(&self, owner_id: &str) -> impl Future<Output = Result<Vec<FileEntry>, RemoteError>> + Send;

    /// Inserts a new row for `owner_id`.
    ///
    /// Fails with `Connectivity`, `Conflict` (duplicate id), or `Validation`.
    fn insert_row(&self, owner_id: &str, entry: &FileEntry) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Deletes rows by id.
    fn delete_rows(&self, ids: &[String]) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Uploads a blob to `path`.
    fn upload_blob(&self, path: &str, bytes: &[u8]) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Deletes blobs by path.
    fn delete_blobs(&self, paths: &[String]) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Returns a public download URL for the blob at `path`. No expiry is assumed.
    fn public_url(&self, path: &str) -> String;
}
