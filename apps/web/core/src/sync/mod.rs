//! Listing synchronization - fetch scheduling, the session loop, and auth lifecycle.

pub(crate) mod events;
pub(crate) mod lifecycle;
pub(crate) mod scheduler;
pub(crate) mod session;

pub use events::SyncEvent;
pub use lifecycle::{LifecycleEvent, forward_lifecycle};
pub use scheduler::{
    BurstProgress, ConnectionStatus, FetchReason, FetchRequest, FetchResolution, FetchStats, SyncScheduler, SyncState,
};
pub use session::{ListingUpdate, SessionContext, SessionError, SessionHandle, Upload};

#[cfg(test)]
mod scheduler_test;
