//! Fetch scheduling: post-sign-in burst, resync coalescing, and capped exponential backoff.
//!
//! `SyncScheduler` is a pure state machine. It never sleeps or talks to the network: callers
//! feed it the current instant and fetch results, it hands back `FetchRequest`s to dispatch
//! and reports the next instant it wants to be woken at (`next_deadline`).
//!
//! At most one fetch is in flight at any time. Requests that arrive while a fetch is running
//! are queued and issued one by one as fetches complete: burst ticks are owed individually so
//! every burst slot still gets its own fetch, while resyncs and due retries collapse into a
//! single out-of-band follow-up that runs once the owed burst fetches are out.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::config::SyncConfig;
use crate::remote::ErrorKind;

/// Why a fetch was dispatched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FetchReason {
    /// First fetch of a session
    Initial,
    /// One of the follow-up fetches of the post-sign-in burst
    Burst,
    /// Out-of-band fetch after a local mutation or an explicit request
    Resync,
    /// Automatic retry after a transient failure
    Retry,
}

impl FetchReason {
    fn is_burst(self) -> bool {
        matches!(self, Self::Initial | Self::Burst)
    }
}

/// A fetch the caller must dispatch. `seq` increases strictly across the scheduler's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub seq: u64,
    pub reason: FetchReason,
}

/// Tri-state connection indicator shown by the UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStatus {
    #[default]
    Connected,
    /// Transient failures happened, or a resync was re-armed after a disconnect, and no fetch
    /// has succeeded since.
    Reconnecting,
    /// The retry cap was exceeded. Only an explicit resync or a new session tries again.
    Disconnected,
}

/// Observable sync state for the current session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub in_flight: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<ErrorKind>,
    pub burst_remaining: u32,
}

/// Burst progress, like "synced 4/10".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BurstProgress {
    pub completed: u32,
    pub total: u32,
}

/// Fetch counters for the current session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FetchStats {
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retries_scheduled: u64,
}

/// What the caller should do with a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchResolution {
    /// True if the result belongs to the fetch currently in flight. A false value means the
    /// response is from an ended session and must be dropped.
    pub accepted: bool,
    /// True if this success ended a streak of connectivity failures.
    pub recovered: bool,
    /// Coalesced fetch to dispatch now.
    pub follow_up: Option<FetchRequest>,
}

/// Decides when the listing is fetched.
#[derive(Debug)]
pub struct SyncScheduler {
    config: SyncConfig,
    active: bool,
    state: SyncState,
    next_seq: u64,
    in_flight: Option<FetchRequest>,
    /// Burst ticks that came due while a fetch was in flight
    burst_owed: u32,
    /// Resync or retry requested while a fetch was in flight
    pending: Option<FetchReason>,
    next_burst_at: Option<Instant>,
    retry_at: Option<Instant>,
    disconnected: bool,
    /// Set by an explicit resync after a disconnect, until a fetch succeeds
    rearmed: bool,
    burst_completed: u32,
    stats: FetchStats,
}

impl SyncScheduler {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            active: false,
            state: SyncState::default(),
            next_seq: 1,
            in_flight: None,
            burst_owed: 0,
            pending: None,
            next_burst_at: None,
            retry_at: None,
            disconnected: false,
            rearmed: false,
            burst_completed: 0,
            stats: FetchStats::default(),
        }
    }

    // ========================================
    // Session lifecycle
    // ========================================

    /// Resets the state, returns the immediate fetch, and schedules the rest of the burst at
    /// `burst_interval` steps.
    ///
    /// A fetch still running from a previous session is forgotten; its result will not be
    /// accepted.
    pub fn start_session(&mut self, now: Instant) -> FetchRequest {
        self.reset();
        self.active = true;

        let follow_ups = self.config.burst_count.saturating_sub(1);
        self.state.burst_remaining = follow_ups;
        if follow_ups > 0 {
            self.next_burst_at = Some(now + self.config.burst_interval);
        }

        info!(
            "Sync session started: 1 immediate fetch + {} burst fetches every {:?}",
            follow_ups, self.config.burst_interval
        );
        self.dispatch(FetchReason::Initial)
    }

    /// Tears the session down. Nothing is scheduled until the next `start_session`.
    pub fn end_session(&mut self) {
        if self.active {
            info!("Sync session ended after {} fetches", self.stats.dispatched);
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.active = false;
        self.state = SyncState::default();
        self.in_flight = None;
        self.burst_owed = 0;
        self.pending = None;
        self.next_burst_at = None;
        self.retry_at = None;
        self.disconnected = false;
        self.rearmed = false;
        self.burst_completed = 0;
        self.stats = FetchStats::default();
    }

    // ========================================
    // Triggers
    // ========================================

    /// Requests one out-of-band fetch, typically after a successful mutation.
    ///
    /// If a fetch is in flight the request is coalesced and issued after it, and after any owed
    /// burst fetches. When the scheduler gave up retrying (disconnected), this re-arms the
    /// backoff; the indicator shows `Reconnecting` until a fetch succeeds.
    pub fn trigger_resync(&mut self) -> Option<FetchRequest> {
        if !self.active {
            debug!("Resync requested without an active session, ignoring");
            return None;
        }
        if self.disconnected {
            info!("Explicit resync while disconnected, re-arming retries");
            self.disconnected = false;
            self.rearmed = true;
            self.state.consecutive_failures = 0;
        }
        self.request(FetchReason::Resync)
    }

    /// Fires every due burst tick and retry. A burst tick and a retry due together produce a
    /// single fetch.
    pub fn on_timer(&mut self, now: Instant) -> Option<FetchRequest> {
        if !self.active {
            return None;
        }

        let mut wanted = None;

        if let Some(at) = self.next_burst_at
            && at <= now
        {
            self.state.burst_remaining = self.state.burst_remaining.saturating_sub(1);
            self.next_burst_at = if self.state.burst_remaining > 0 {
                Some(at + self.config.burst_interval)
            } else {
                None
            };
            wanted = Some(FetchReason::Burst);
        }

        if let Some(at) = self.retry_at
            && at <= now
        {
            self.retry_at = None;
            wanted = wanted.or(Some(FetchReason::Retry));
        }

        wanted.and_then(|reason| self.request(reason))
    }

    fn request(&mut self, reason: FetchReason) -> Option<FetchRequest> {
        if let Some(running) = self.in_flight {
            debug!(
                "{:?} fetch requested while seq={} is in flight, coalescing",
                reason, running.seq
            );
            match reason {
                FetchReason::Burst => self.burst_owed += 1,
                // A queued resync already covers a retry
                FetchReason::Resync | FetchReason::Retry if self.pending != Some(FetchReason::Resync) => {
                    self.pending = Some(reason);
                }
                _ => {}
            }
            return None;
        }
        Some(self.dispatch(reason))
    }

    /// Next queued fetch: owed burst ticks first, then the pending resync or retry.
    fn follow_up(&mut self) -> Option<FetchRequest> {
        if self.burst_owed > 0 {
            self.burst_owed -= 1;
            if self.pending == Some(FetchReason::Retry) {
                self.pending = None;
            }
            return Some(self.dispatch(FetchReason::Burst));
        }
        self.pending.take().map(|reason| self.dispatch(reason))
    }

    fn dispatch(&mut self, reason: FetchReason) -> FetchRequest {
        let request = FetchRequest {
            seq: self.next_seq,
            reason,
        };
        self.next_seq += 1;
        self.in_flight = Some(request);
        self.state.in_flight = true;
        self.stats.dispatched += 1;
        debug!("Dispatching {:?} fetch seq={}", reason, request.seq);
        request
    }

    // ========================================
    // Results
    // ========================================

    /// Records the outcome of fetch `seq`.
    ///
    /// Success clears failures and any pending retry. A transient failure schedules a retry
    /// after `retry_base * factor^(failures - 1)` until the cap is exceeded, then the scheduler
    /// reports `Disconnected`. Permanent failures are recorded but never retried, and they
    /// cancel any retry still pending from earlier failures.
    pub fn on_fetch_result(&mut self, seq: u64, outcome: Result<(), ErrorKind>, now: Instant) -> FetchResolution {
        let Some(running) = self.in_flight.filter(|running| running.seq == seq) else {
            debug!("Dropping result of fetch seq={} (not in flight)", seq);
            return FetchResolution {
                accepted: false,
                recovered: false,
                follow_up: None,
            };
        };

        self.in_flight = None;
        self.state.in_flight = false;
        if running.reason.is_burst() {
            self.burst_completed += 1;
        }

        let mut recovered = false;
        match outcome {
            Ok(()) => {
                recovered = self.state.consecutive_failures > 0 || self.rearmed;
                if recovered {
                    info!("Fetch seq={} succeeded, connection restored", seq);
                }
                self.stats.succeeded += 1;
                self.state.consecutive_failures = 0;
                self.state.last_error = None;
                self.retry_at = None;
                self.disconnected = false;
                self.rearmed = false;
                if self.pending == Some(FetchReason::Retry) {
                    self.pending = None;
                }
            }
            Err(kind) if kind.is_transient() => {
                self.stats.failed += 1;
                self.state.consecutive_failures += 1;
                self.state.last_error = Some(kind);
                let failures = self.state.consecutive_failures;
                match self.config.retry_delay(failures) {
                    Some(delay) => self.schedule_retry(now, delay, failures),
                    None => {
                        if !self.disconnected {
                            warn!(
                                "Fetch failed {} times in a row, giving up until the next explicit resync",
                                failures
                            );
                        }
                        self.retry_at = None;
                        self.disconnected = true;
                    }
                }
            }
            Err(kind) => {
                self.stats.failed += 1;
                self.state.last_error = Some(kind);
                // Drops a retry left by an earlier transient failure too
                self.retry_at = None;
                if self.pending == Some(FetchReason::Retry) {
                    self.pending = None;
                }
                warn!("Fetch seq={} failed permanently ({:?}), not retrying", seq, kind);
            }
        }

        let follow_up = self.follow_up();
        FetchResolution {
            accepted: true,
            recovered,
            follow_up,
        }
    }

    fn schedule_retry(&mut self, now: Instant, delay: Duration, failures: u32) {
        // One pending retry at a time: a newer failure moves it
        self.retry_at = Some(now + delay);
        self.stats.retries_scheduled += 1;
        info!("Fetch failed ({} in a row), retrying in {:?}", failures, delay);
    }

    // ========================================
    // Queries
    // ========================================

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Earliest instant at which `on_timer` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.next_burst_at, self.retry_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Instant of the pending automatic retry, if any.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    pub fn in_flight(&self) -> Option<FetchRequest> {
        self.in_flight
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn stats(&self) -> FetchStats {
        self.stats
    }

    pub fn status(&self) -> ConnectionStatus {
        if self.disconnected {
            ConnectionStatus::Disconnected
        } else if self.state.consecutive_failures > 0 || self.rearmed {
            ConnectionStatus::Reconnecting
        } else {
            ConnectionStatus::Connected
        }
    }

    pub fn burst_progress(&self) -> BurstProgress {
        BurstProgress {
            completed: self.burst_completed,
            total: if self.active { self.config.burst_count } else { 0 },
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}
