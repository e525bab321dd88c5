//! Error types for remote listing operations.

use serde::{Deserialize, Serialize};

/// Classification of a remote failure, without the payload.
///
/// Kept in `SyncState::last_error` and used by the scheduler to decide whether to retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Connectivity,
    Permission,
    Validation,
    Conflict,
    NotFound,
}

impl ErrorKind {
    /// Returns true for network-class failures that may succeed on retry.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Connectivity)
    }
}

/// Error types for remote listing operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum RemoteError {
    /// Network failure; the request may not have reached the service.
    Connectivity { message: String },
    /// Not signed in, or the session lacks access.
    Permission { message: String },
    /// The service rejected the input.
    Validation { message: String },
    /// Row id or blob path already exists.
    Conflict { target: String },
    /// Row or blob doesn't exist.
    NotFound { target: String },
}

impl RemoteError {
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::Permission { .. } => ErrorKind::Permission,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    /// Returns true if the operation may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_transient()
    }

    /// Returns a user-friendly message for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Connectivity { .. } => "Couldn't reach the server. Retrying...".to_string(),
            Self::Permission { .. } => "You don't have access. Try signing in again.".to_string(),
            Self::Validation { message } => format!("The server rejected the request: {}", message),
            Self::Conflict { .. } => "A file with the same identity already exists. Try again.".to_string(),
            Self::NotFound { .. } => "The file no longer exists. It may have been deleted.".to_string(),
        }
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connectivity { message } => write!(f, "Connectivity error: {message}"),
            Self::Permission { message } => write!(f, "Permission denied: {message}"),
            Self::Validation { message } => write!(f, "Validation failed: {message}"),
            Self::Conflict { target } => write!(f, "Already exists: {target}"),
            Self::NotFound { target } => write!(f, "Not found: {target}"),
        }
    }
}

impl std::error::Error for RemoteError {}
