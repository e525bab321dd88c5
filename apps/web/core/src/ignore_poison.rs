//! Extension traits to ignore lock poisoning.
//!
//! The in-memory backend keeps plain rows and byte blobs behind std locks. A panic in another
//! test thread doesn't invalidate that data, so `.lock_ignore_poison()` replaces the
//! `.lock().unwrap_or_else(|e| e.into_inner())` boilerplate.

use std::sync::{Mutex, MutexGuard};

pub trait IgnorePoison<T> {
    /// Locks the mutex, ignoring poison.
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T>;
}

impl<T> IgnorePoison<T> for Mutex<T> {
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|e| e.into_inner())
    }
}
