//! Session context: the single task that owns the listing and drives the sync loop.
//!
//! `SessionContext::run` is one tokio task. It owns the `ListingStore` and the `SyncScheduler`,
//! executes the fetches the scheduler asks for, runs remote mutations, and publishes a fresh
//! `ListingUpdate` after every state change. Remote calls are futures polled by the loop itself,
//! so a slow call only suspends its own operation.
//!
//! The UI talks to the loop through a cloneable `SessionHandle`: commands go over an mpsc
//! channel with oneshot replies, listing updates come back through a watch channel and
//! notifications through a broadcast channel.

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::SyncConfig;
use crate::listing::{
    BatchUpload, ClickMode, FileEntry, ListingStats, ListingStore, RemovalPlan, SelectionSet, SnapshotOutcome,
    create_entries, remove_entries,
};
use crate::remote::{RemoteError, RemoteListingClient};
use crate::sync::events::SyncEvent;
use crate::sync::scheduler::{BurstProgress, ConnectionStatus, FetchRequest, SyncScheduler, SyncState};

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Public types
// ============================================================================

/// A file picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, mime: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.map(str::to_string),
            bytes,
        }
    }
}

/// Everything the view layer renders, published after every change.
#[derive(Debug, Clone)]
pub struct ListingUpdate {
    /// Signed-in user, `None` between sessions.
    pub owner_id: Option<String>,
    pub entries: Arc<[FileEntry]>,
    pub selection: SelectionSet,
    pub status: ConnectionStatus,
    pub sync: SyncState,
    pub stats: ListingStats,
    pub burst: BurstProgress,
    /// Increases with every published update.
    pub revision: u64,
}

impl ListingUpdate {
    fn empty() -> Self {
        Self {
            owner_id: None,
            entries: Arc::from(Vec::new()),
            selection: SelectionSet::new(),
            status: ConnectionStatus::Connected,
            sync: SyncState::default(),
            stats: ListingStats {
                file_count: 0,
                total_bytes: 0,
                usage_percent: 0.0,
            },
            burst: BurstProgress::default(),
            revision: 0,
        }
    }
}

/// Errors returned by `SessionHandle` operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SessionError {
    /// No user is signed in.
    NoActiveSession,
    /// The id isn't in the current listing.
    UnknownEntry { id: String },
    /// The session loop has shut down.
    Closed,
    /// The backend rejected or failed the operation.
    Remote { error: RemoteError },
}

impl SessionError {
    /// Returns a user-friendly message for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoActiveSession => "Sign in to manage your files.".to_string(),
            Self::UnknownEntry { .. } => "That file is no longer in your list.".to_string(),
            Self::Closed => "The file list stopped syncing. Reload the page.".to_string(),
            Self::Remote { error } => error.user_message(),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveSession => write!(f, "No active session"),
            Self::UnknownEntry { id } => write!(f, "Unknown entry: {}", id),
            Self::Closed => write!(f, "Session loop closed"),
            Self::Remote { error } => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Remote { error } => Some(error),
            _ => None,
        }
    }
}

impl From<RemoteError> for SessionError {
    fn from(error: RemoteError) -> Self {
        Self::Remote { error }
    }
}

// ============================================================================
// Commands and completions
// ============================================================================

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum SessionCommand {
    Start { owner_id: String, reply: Reply<()> },
    End { reply: Reply<()> },
    Resync { reply: Reply<()> },
    Create { uploads: Vec<Upload>, reply: Reply<Vec<FileEntry>> },
    Remove { ids: Vec<String>, reply: Reply<usize> },
    Click { id: String, mode: ClickMode, reply: Reply<bool> },
    ClearSelection { reply: Reply<()> },
    DownloadUrl { id: String, reply: Reply<String> },
}

/// A finished remote call, handed back to the loop.
enum Completion {
    Fetch {
        seq: u64,
        result: Result<Vec<FileEntry>, RemoteError>,
    },
    Created {
        epoch: u64,
        outcome: BatchUpload,
        reply: Reply<Vec<FileEntry>>,
    },
    Removed {
        epoch: u64,
        plan: RemovalPlan,
        result: Result<(), RemoteError>,
        reply: Reply<usize>,
    },
}

fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Session context
// ============================================================================

/// Single owner of the listing state for the signed-in user.
pub struct SessionContext<C: RemoteListingClient> {
    client: Arc<C>,
    config: SyncConfig,
    store: ListingStore,
    scheduler: SyncScheduler,
    /// Bumped on every session start and end. Mutations started in an older epoch don't
    /// touch the current state when they finish.
    epoch: u64,
    revision: u64,
    pending: FuturesUnordered<BoxFuture<'static, Completion>>,
    commands: mpsc::Receiver<SessionCommand>,
    updates: watch::Sender<ListingUpdate>,
    events: broadcast::Sender<SyncEvent>,
}

impl<C: RemoteListingClient> SessionContext<C> {
    pub fn new(client: Arc<C>, config: SyncConfig) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (update_tx, update_rx) = watch::channel(ListingUpdate::empty());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let handle = SessionHandle {
            commands: command_tx,
            updates: update_rx,
            events: event_tx.clone(),
        };
        let context = Self {
            client,
            scheduler: SyncScheduler::new(config.clone()),
            config,
            store: ListingStore::new(),
            epoch: 0,
            revision: 0,
            pending: FuturesUnordered::new(),
            commands: command_rx,
            updates: update_tx,
            events: event_tx,
        };
        (context, handle)
    }

    /// Creates a context and spawns its loop on the current tokio runtime.
    pub fn spawn(client: Arc<C>, config: SyncConfig) -> SessionHandle {
        let (context, handle) = Self::new(client, config);
        tokio::spawn(context.run());
        handle
    }

    /// Runs until every `SessionHandle` is dropped.
    pub async fn run(mut self) {
        debug!("Session loop started");
        loop {
            let deadline = self.scheduler.next_deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(completion) = self.pending.next(), if !self.pending.is_empty() => {
                    self.handle_completion(completion);
                }
                _ = sleep_until(deadline) => {
                    if let Some(request) = self.scheduler.on_timer(clock_now()) {
                        self.dispatch_fetch(request);
                    }
                    self.publish();
                }
            }
        }
        debug!("Session loop exited ({} operations abandoned)", self.pending.len());
    }

    // ========================================
    // Commands
    // ========================================

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start { owner_id, reply } => {
                self.start_session(owner_id);
                let _ = reply.send(Ok(()));
            }
            SessionCommand::End { reply } => {
                self.end_session();
                let _ = reply.send(Ok(()));
            }
            SessionCommand::Resync { reply } => {
                let _ = reply.send(self.resync());
            }
            SessionCommand::Create { uploads, reply } => self.create(uploads, reply),
            SessionCommand::Remove { ids, reply } => self.remove(ids, reply),
            SessionCommand::Click { id, mode, reply } => {
                let changed = self.store.click(&id, mode);
                if changed {
                    self.publish();
                }
                let _ = reply.send(Ok(changed));
            }
            SessionCommand::ClearSelection { reply } => {
                self.store.clear_selection();
                self.publish();
                let _ = reply.send(Ok(()));
            }
            SessionCommand::DownloadUrl { id, reply } => {
                let _ = reply.send(self.download_url(&id));
            }
        }
    }

    fn start_session(&mut self, owner_id: String) {
        if self.store.owner_id().is_some() {
            self.end_session();
        }
        info!("Session started for {}", owner_id);
        self.epoch += 1;
        self.store.reset(Some(owner_id.clone()));
        let request = self.scheduler.start_session(clock_now());
        self.dispatch_fetch(request);
        self.emit(SyncEvent::SessionStarted { owner_id });
        self.publish();
    }

    fn end_session(&mut self) {
        let Some(owner_id) = self.store.owner_id().map(str::to_string) else {
            debug!("End requested without an active session");
            return;
        };
        info!("Session ended for {}", owner_id);
        self.epoch += 1;
        self.store.reset(None);
        self.scheduler.end_session();
        self.emit(SyncEvent::SessionEnded);
        self.publish();
    }

    fn resync(&mut self) -> Result<(), SessionError> {
        if self.store.owner_id().is_none() {
            return Err(SessionError::NoActiveSession);
        }
        if let Some(request) = self.scheduler.trigger_resync() {
            self.dispatch_fetch(request);
        }
        self.publish();
        Ok(())
    }

    fn create(&mut self, uploads: Vec<Upload>, reply: Reply<Vec<FileEntry>>) {
        let Some(owner_id) = self.store.owner_id().map(str::to_string) else {
            let _ = reply.send(Err(SessionError::NoActiveSession));
            return;
        };
        if uploads.is_empty() {
            let _ = reply.send(Ok(Vec::new()));
            return;
        }

        let now = Utc::now();
        let mut items = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let size = upload.bytes.len() as u64;
            let entry = self.store.prepare_create(&upload.name, size, upload.mime.as_deref(), now);
            if let Some(entry) = entry {
                items.push((entry, upload.bytes));
            }
        }

        debug!("Uploading {} files for {}", items.len(), owner_id);
        let client = Arc::clone(&self.client);
        let epoch = self.epoch;
        self.pending.push(
            async move {
                let outcome = create_entries(client.as_ref(), &owner_id, items).await;
                Completion::Created { epoch, outcome, reply }
            }
            .boxed(),
        );
    }

    fn remove(&mut self, ids: Vec<String>, reply: Reply<usize>) {
        if self.store.owner_id().is_none() {
            let _ = reply.send(Err(SessionError::NoActiveSession));
            return;
        }

        let plan = self.store.plan_removal(&ids);
        if !plan.missing.is_empty() {
            debug!("Ignoring {} ids not in the listing: {:?}", plan.missing.len(), plan.missing);
        }
        if plan.is_empty() {
            let _ = reply.send(Ok(0));
            return;
        }

        let client = Arc::clone(&self.client);
        let epoch = self.epoch;
        self.pending.push(
            async move {
                let result = remove_entries(client.as_ref(), &plan).await;
                Completion::Removed {
                    epoch,
                    plan,
                    result,
                    reply,
                }
            }
            .boxed(),
        );
    }

    fn download_url(&self, id: &str) -> Result<String, SessionError> {
        if self.store.owner_id().is_none() {
            return Err(SessionError::NoActiveSession);
        }
        self.store
            .get(id)
            .map(|entry| self.client.public_url(&entry.storage_path))
            .ok_or_else(|| SessionError::UnknownEntry { id: id.to_string() })
    }

    // ========================================
    // Completions
    // ========================================

    fn dispatch_fetch(&mut self, request: FetchRequest) {
        let Some(owner_id) = self.store.owner_id().map(str::to_string) else {
            warn!("Fetch seq={} requested without an owner, skipping", request.seq);
            return;
        };
        let client = Arc::clone(&self.client);
        self.pending.push(
            async move {
                let result = client.fetch_all(&owner_id).await;
                Completion::Fetch {
                    seq: request.seq,
                    result,
                }
            }
            .boxed(),
        );
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Fetch { seq, result } => self.finish_fetch(seq, result),
            Completion::Created { epoch, outcome, reply } => self.finish_create(epoch, outcome, reply),
            Completion::Removed {
                epoch,
                plan,
                result,
                reply,
            } => self.finish_remove(epoch, plan, result, reply),
        }
    }

    fn finish_fetch(&mut self, seq: u64, result: Result<Vec<FileEntry>, RemoteError>) {
        let outcome = result.as_ref().map(|_| ()).map_err(RemoteError::kind);
        let resolution = self.scheduler.on_fetch_result(seq, outcome, clock_now());
        if !resolution.accepted {
            debug!("Discarding response of fetch seq={} from an ended session", seq);
            return;
        }

        match result {
            Ok(entries) => {
                if let SnapshotOutcome::Applied { .. } = self.store.apply_snapshot(entries, seq) {
                    self.emit(SyncEvent::Synced {
                        seq,
                        entry_count: self.store.entries().len(),
                    });
                }
                if resolution.recovered {
                    self.emit(SyncEvent::Reconnected);
                }
            }
            Err(error) => {
                warn!("Fetch seq={} failed: {}", seq, error);
                self.emit(SyncEvent::FetchFailed {
                    error,
                    status: self.scheduler.status(),
                });
            }
        }

        if let Some(follow_up) = resolution.follow_up {
            self.dispatch_fetch(follow_up);
        }
        self.publish();
    }

    fn finish_create(&mut self, epoch: u64, outcome: BatchUpload, reply: Reply<Vec<FileEntry>>) {
        let created_ids: Vec<String> = outcome.created.iter().map(|e| e.id.clone()).collect();

        if epoch == self.epoch {
            if !outcome.created.is_empty()
                && let Some(request) = self.scheduler.trigger_resync()
            {
                self.dispatch_fetch(request);
            }
            match &outcome.error {
                None => self.emit(SyncEvent::Uploaded { ids: created_ids }),
                Some(error) => self.emit(SyncEvent::UploadFailed {
                    created: created_ids,
                    error: error.clone(),
                }),
            }
            self.publish();
        } else {
            debug!("Upload finished after its session ended");
        }

        let result = match outcome.error {
            None => Ok(outcome.created),
            Some(error) => {
                warn!("Upload failed: {}", error);
                Err(SessionError::from(error))
            }
        };
        let _ = reply.send(result);
    }

    fn finish_remove(&mut self, epoch: u64, plan: RemovalPlan, result: Result<(), RemoteError>, reply: Reply<usize>) {
        if epoch == self.epoch {
            match &result {
                Ok(()) => {
                    self.store.commit_removal(&plan);
                    if let Some(request) = self.scheduler.trigger_resync() {
                        self.dispatch_fetch(request);
                    }
                    self.emit(SyncEvent::Removed { ids: plan.ids() });
                }
                Err(error) => self.emit(SyncEvent::RemoveFailed { error: error.clone() }),
            }
            self.publish();
        } else {
            debug!("Delete finished after its session ended");
        }

        let result = match result {
            Ok(()) => Ok(plan.entries.len()),
            Err(error) => {
                warn!("Delete of {} entries failed: {}", plan.entries.len(), error);
                Err(SessionError::from(error))
            }
        };
        let _ = reply.send(result);
    }

    // ========================================
    // Publishing
    // ========================================

    fn publish(&mut self) {
        self.revision += 1;
        let update = ListingUpdate {
            owner_id: self.store.owner_id().map(str::to_string),
            entries: self.store.shared_entries(),
            selection: self.store.selection().clone(),
            status: self.scheduler.status(),
            sync: self.scheduler.state(),
            stats: self.store.stats(self.config.quota_bytes),
            burst: self.scheduler.burst_progress(),
            revision: self.revision,
        };
        self.updates.send_replace(update);
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable handle to a running `SessionContext`.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    updates: watch::Receiver<ListingUpdate>,
    events: broadcast::Sender<SyncEvent>,
}

impl SessionHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> SessionCommand) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)?
    }

    /// Binds the session to `owner_id` and starts the fetch burst. Replaces any running session.
    pub async fn start_session(&self, owner_id: impl Into<String>) -> Result<(), SessionError> {
        let owner_id = owner_id.into();
        self.request(|reply| SessionCommand::Start { owner_id, reply }).await
    }

    /// Clears the listing and the selection and stops all scheduling.
    pub async fn end_session(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::End { reply }).await
    }

    /// Asks for one extra fetch. Re-arms retries after a disconnect.
    pub async fn resync(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Resync { reply }).await
    }

    /// Uploads one file and returns its new entry once the row exists.
    pub async fn upload(&self, upload: Upload) -> Result<FileEntry, SessionError> {
        let created = self.upload_many(vec![upload]).await?;
        // One upload in, one entry out
        created.into_iter().next().ok_or(SessionError::Closed)
    }

    /// Uploads files one after another, stopping at the first failure.
    pub async fn upload_many(&self, uploads: Vec<Upload>) -> Result<Vec<FileEntry>, SessionError> {
        self.request(|reply| SessionCommand::Create { uploads, reply }).await
    }

    /// Deletes one entry. Returns the number of entries deleted (0 for an unknown id).
    pub async fn remove(&self, id: impl Into<String>) -> Result<usize, SessionError> {
        self.remove_many(vec![id.into()]).await
    }

    pub async fn remove_many(&self, ids: Vec<String>) -> Result<usize, SessionError> {
        self.request(|reply| SessionCommand::Remove { ids, reply }).await
    }

    /// Applies a row click. Returns false if the id isn't in the listing.
    pub async fn click(&self, id: impl Into<String>, mode: ClickMode) -> Result<bool, SessionError> {
        let id = id.into();
        self.request(|reply| SessionCommand::Click { id, mode, reply }).await
    }

    pub async fn clear_selection(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::ClearSelection { reply }).await
    }

    /// Public URL of an entry's blob.
    pub async fn download_url(&self, id: impl Into<String>) -> Result<String, SessionError> {
        let id = id.into();
        self.request(|reply| SessionCommand::DownloadUrl { id, reply }).await
    }

    /// Latest published listing.
    pub fn listing(&self) -> ListingUpdate {
        self.updates.borrow().clone()
    }

    pub fn subscribe_updates(&self) -> watch::Receiver<ListingUpdate> {
        self.updates.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }
}
