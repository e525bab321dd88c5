// Warn on unused dependencies to catch feature/cfg mismatches
#![warn(unused_crate_dependencies)]
// Warn on redundant path prefixes (e.g., std::time::Duration when Duration is imported)
#![warn(unused_qualifications)]
// Use log::* macros instead of println!/eprintln! for proper log level control
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod format;
mod ignore_poison;
pub mod listing;
pub mod logging;
pub mod remote;
pub mod settings;
pub mod sync;

pub use config::SyncConfig;
pub use listing::{
    ClickMode, EntryKind, FileEntry, ListingStats, ListingStore, MediaKind, SelectionSet, SortKey, SortOrder,
    ViewRow, ViewState, project,
};
pub use remote::{ErrorKind, InMemoryRemote, RemoteError, RemoteListingClient};
pub use sync::{
    ConnectionStatus, LifecycleEvent, ListingUpdate, SessionContext, SessionError, SessionHandle, SyncEvent,
    SyncScheduler, Upload,
};
