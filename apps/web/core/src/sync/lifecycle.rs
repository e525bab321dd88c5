//! Sign-in / sign-out transitions from the auth layer.
//!
//! The auth provider reports every auth state change, including token refreshes for the same
//! user. `forward_lifecycle` turns that stream into session starts and ends, ignoring repeats.

use log::{debug, warn};
use tokio::sync::mpsc;

use crate::sync::session::SessionHandle;

/// Auth state change as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started { owner_id: String },
    Ended,
}

impl LifecycleEvent {
    /// Maps the provider's "current user" value to an event.
    pub fn from_user(owner_id: Option<String>) -> Self {
        match owner_id {
            Some(owner_id) => Self::Started { owner_id },
            None => Self::Ended,
        }
    }
}

/// Drives `handle` from auth state changes until `events` closes or the session loop stops.
pub async fn forward_lifecycle(handle: SessionHandle, mut events: mpsc::Receiver<LifecycleEvent>) {
    let mut current: Option<String> = None;

    while let Some(event) = events.recv().await {
        let result = match event {
            LifecycleEvent::Started { owner_id } => {
                if current.as_deref() == Some(owner_id.as_str()) {
                    debug!("Auth state change for the signed-in user, session kept");
                    continue;
                }
                current = Some(owner_id.clone());
                handle.start_session(owner_id).await
            }
            LifecycleEvent::Ended => {
                if current.take().is_none() {
                    continue;
                }
                handle.end_session().await
            }
        };

        if let Err(e) = result {
            warn!("Session loop stopped, no longer forwarding auth changes: {}", e);
            break;
        }
    }
}
