//! In-memory remote backend for testing and demos.
//!
//! Keeps rows and blobs in process memory and supports fault injection per operation,
//! artificial latency, and call counters.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{RemoteError, RemoteListingClient};
use crate::ignore_poison::IgnorePoison;
use crate::listing::FileEntry;

/// Default base URL for public blob links.
const DEFAULT_PUBLIC_BASE_URL: &str = "https://storage.invalid/object/public/files";

/// Operations of the remote contract, used to target faults and read call counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    FetchAll,
    InsertRow,
    DeleteRows,
    UploadBlob,
    DeleteBlobs,
}

#[derive(Default)]
struct Backend {
    /// (owner id, row)
    rows: Vec<(String, FileEntry)>,
    blobs: HashMap<String, Vec<u8>>,
    faults: HashMap<RemoteOp, VecDeque<RemoteError>>,
    calls: HashMap<RemoteOp, usize>,
}

/// In-memory implementation of `RemoteListingClient`.
pub struct InMemoryRemote {
    backend: Mutex<Backend>,
    latency: Mutex<HashMap<RemoteOp, Duration>>,
    public_base_url: String,
    fetches_in_flight: AtomicUsize,
    max_fetches_in_flight: AtomicUsize,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            backend: Mutex::new(Backend::default()),
            latency: Mutex::new(HashMap::new()),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            fetches_in_flight: AtomicUsize::new(0),
            max_fetches_in_flight: AtomicUsize::new(0),
        }
    }

    /// Creates a backend pre-populated with rows (and empty blobs) for `owner_id`.
    pub fn with_entries(owner_id: &str, entries: Vec<FileEntry>) -> Self {
        let remote = Self::new();
        {
            let mut backend = remote.backend.lock_ignore_poison();
            for entry in entries {
                backend.blobs.insert(entry.storage_path.clone(), Vec::new());
                backend.rows.push((owner_id.to_string(), entry));
            }
        }
        remote
    }

    pub fn with_public_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.public_base_url = base_url.into();
        self
    }

    /// Delays every call of `op` by `latency` before it touches the backend.
    pub fn set_latency(&self, op: RemoteOp, latency: Duration) {
        self.latency.lock_ignore_poison().insert(op, latency);
    }

    /// Makes the next call of `op` fail with `error`. Calls queue up: each injected fault is
    /// consumed by exactly one call.
    pub fn fail_next(&self, op: RemoteOp, error: RemoteError) {
        self.backend
            .lock_ignore_poison()
            .faults
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Makes the next `times` calls of `op` fail with `error`.
    pub fn fail_times(&self, op: RemoteOp, times: usize, error: RemoteError) {
        for _ in 0..times {
            self.fail_next(op, error.clone());
        }
    }

    /// Number of calls made to `op` so far, including failed ones.
    pub fn calls(&self, op: RemoteOp) -> usize {
        self.backend.lock_ignore_poison().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of `fetch_all` calls running right now.
    pub fn fetches_in_flight(&self) -> usize {
        self.fetches_in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of `fetch_all` calls that were running at the same time.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_fetches_in_flight.load(Ordering::SeqCst)
    }

    /// Rows currently stored for `owner_id`.
    pub fn rows_for(&self, owner_id: &str) -> Vec<FileEntry> {
        self.backend
            .lock_ignore_poison()
            .rows
            .iter()
            .filter(|(owner, _)| owner == owner_id)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub fn has_blob(&self, path: &str) -> bool {
        self.backend.lock_ignore_poison().blobs.contains_key(path)
    }

    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.backend.lock_ignore_poison().blobs.get(path).cloned()
    }

    /// Inserts a row directly, bypassing faults and counters. Simulates a change made by
    /// another client.
    pub fn insert_external(&self, owner_id: &str, entry: FileEntry) {
        self.backend
            .lock_ignore_poison()
            .rows
            .push((owner_id.to_string(), entry));
    }

    /// Counts the call, waits for the configured latency, then returns an injected fault if any.
    async fn begin(&self, op: RemoteOp) -> Result<(), RemoteError> {
        *self.backend.lock_ignore_poison().calls.entry(op).or_default() += 1;

        let latency = self.latency.lock_ignore_poison().get(&op).copied();
        if let Some(latency) = latency
            && !latency.is_zero()
        {
            tokio::time::sleep(latency).await;
        }

        let fault = self
            .backend
            .lock_ignore_poison()
            .faults
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        match fault {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Counts a running `fetch_all` until dropped, even if its future is abandoned mid-flight.
struct FetchGauge<'a> {
    running: &'a AtomicUsize,
}

impl<'a> FetchGauge<'a> {
    fn enter(running: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now_running = running.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now_running, Ordering::SeqCst);
        Self { running }
    }
}

impl Drop for FetchGauge<'_> {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RemoteListingClient for InMemoryRemote {
    async fn fetch_all(&self, owner_id: &str) -> Result<Vec<FileEntry>, RemoteError> {
        let _running = FetchGauge::enter(&self.fetches_in_flight, &self.max_fetches_in_flight);
        self.begin(RemoteOp::FetchAll).await.map(|_| self.rows_for(owner_id))
    }

    async fn insert_row(&self, owner_id: &str, entry: &FileEntry) -> Result<(), RemoteError> {
        self.begin(RemoteOp::InsertRow).await?;

        if entry.name.trim().is_empty() {
            return Err(RemoteError::validation("name must not be empty"));
        }

        let mut backend = self.backend.lock_ignore_poison();
        if backend.rows.iter().any(|(_, row)| row.id == entry.id) {
            return Err(RemoteError::Conflict {
                target: entry.id.clone(),
            });
        }
        backend.rows.push((owner_id.to_string(), entry.clone()));
        Ok(())
    }

    async fn delete_rows(&self, ids: &[String]) -> Result<(), RemoteError> {
        self.begin(RemoteOp::DeleteRows).await?;

        // Like the hosted row store, deleting ids that don't exist is not an error
        self.backend
            .lock_ignore_poison()
            .rows
            .retain(|(_, row)| !ids.contains(&row.id));
        Ok(())
    }

    async fn upload_blob(&self, path: &str, bytes: &[u8]) -> Result<(), RemoteError> {
        self.begin(RemoteOp::UploadBlob).await?;

        let mut backend = self.backend.lock_ignore_poison();
        if backend.blobs.contains_key(path) {
            return Err(RemoteError::Conflict {
                target: path.to_string(),
            });
        }
        backend.blobs.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete_blobs(&self, paths: &[String]) -> Result<(), RemoteError> {
        self.begin(RemoteOp::DeleteBlobs).await?;

        let mut backend = self.backend.lock_ignore_poison();
        for path in paths {
            backend.blobs.remove(path);
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.public_base_url, encoded.join("/"))
    }
}
