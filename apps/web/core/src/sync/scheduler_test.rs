//! Tests for the fetch scheduler: burst, coalescing, and backoff

use super::scheduler::{ConnectionStatus, FetchReason, FetchRequest, SyncScheduler};
use crate::config::SyncConfig;
use crate::remote::ErrorKind;
use std::time::{Duration, Instant};

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Config without burst follow-ups, to look at retries in isolation
fn no_burst() -> SyncConfig {
    SyncConfig {
        burst_count: 1,
        ..SyncConfig::default()
    }
}

fn fail(scheduler: &mut SyncScheduler, request: FetchRequest, now: Instant) -> Option<FetchRequest> {
    scheduler
        .on_fetch_result(request.seq, Err(ErrorKind::Connectivity), now)
        .follow_up
}

fn succeed(scheduler: &mut SyncScheduler, request: FetchRequest, now: Instant) -> Option<FetchRequest> {
    scheduler.on_fetch_result(request.seq, Ok(()), now).follow_up
}

// ============================================================================
// Burst
// ============================================================================

#[test]
fn test_burst_issues_ten_fetches_over_nine_seconds() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(SyncConfig::default());

    let first = scheduler.start_session(t0);
    assert_eq!(first.reason, FetchReason::Initial);
    assert_eq!(scheduler.state().burst_remaining, 9);
    succeed(&mut scheduler, first, t0);

    let mut fired = vec![Duration::ZERO];
    while let Some(deadline) = scheduler.next_deadline() {
        let request = scheduler.on_timer(deadline).expect("burst tick should dispatch");
        assert_eq!(request.reason, FetchReason::Burst);
        fired.push(deadline - t0);
        succeed(&mut scheduler, request, deadline);
    }

    assert_eq!(fired, (0..10).map(secs).collect::<Vec<_>>());
    assert_eq!(scheduler.state().burst_remaining, 0);
    assert_eq!(scheduler.burst_progress().completed, 10);
    assert_eq!(scheduler.burst_progress().total, 10);
    assert_eq!(scheduler.stats().dispatched, 10);
}

#[test]
fn test_burst_continues_after_failures() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(SyncConfig::default());

    let first = scheduler.start_session(t0);
    fail(&mut scheduler, first, t0);

    // Burst tick at 1s still fires even though a retry is pending at 2s
    let tick = scheduler.on_timer(t0 + secs(1)).unwrap();
    assert_eq!(tick.reason, FetchReason::Burst);
    fail(&mut scheduler, tick, t0 + secs(1));

    assert_eq!(scheduler.state().burst_remaining, 8);
    assert_eq!(scheduler.state().consecutive_failures, 2);
    assert!(scheduler.next_deadline().is_some());
}

#[test]
fn test_early_timer_call_does_nothing() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(SyncConfig::default());
    let first = scheduler.start_session(t0);
    succeed(&mut scheduler, first, t0);

    assert_eq!(scheduler.on_timer(t0 + Duration::from_millis(999)), None);
    assert_eq!(scheduler.state().burst_remaining, 9);
}

// ============================================================================
// Backoff
// ============================================================================

#[test]
fn test_four_connectivity_failures_schedule_exactly_three_retries() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(no_burst());

    let mut request = scheduler.start_session(t0);
    let mut now = t0;
    let mut delays = Vec::new();

    for _ in 0..3 {
        fail(&mut scheduler, request, now);
        assert_eq!(scheduler.status(), ConnectionStatus::Reconnecting);
        let retry_at = scheduler.retry_at().expect("retry should be pending");
        delays.push(retry_at - now);
        now = retry_at;
        request = scheduler.on_timer(now).expect("retry should dispatch");
        assert_eq!(request.reason, FetchReason::Retry);
    }

    // Fourth failure exceeds the cap
    fail(&mut scheduler, request, now);

    assert_eq!(delays, vec![secs(2), secs(4), secs(8)]);
    assert_eq!(scheduler.stats().retries_scheduled, 3);
    assert_eq!(scheduler.retry_at(), None);
    assert_eq!(scheduler.next_deadline(), None);
    assert_eq!(scheduler.status(), ConnectionStatus::Disconnected);
    assert_eq!(scheduler.state().consecutive_failures, 4);
    assert_eq!(scheduler.on_timer(now + secs(60)), None);
}

#[test]
fn test_success_resets_failures_and_clears_retry() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(no_burst());

    let first = scheduler.start_session(t0);
    fail(&mut scheduler, first, t0);
    assert!(scheduler.retry_at().is_some());

    let resync = scheduler.trigger_resync().unwrap();
    succeed(&mut scheduler, resync, t0 + secs(1));

    assert_eq!(scheduler.state().consecutive_failures, 0);
    assert_eq!(scheduler.state().last_error, None);
    assert_eq!(scheduler.retry_at(), None);
    assert_eq!(scheduler.status(), ConnectionStatus::Connected);
}

#[test]
fn test_newer_failure_reschedules_pending_retry() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(no_burst());

    let first = scheduler.start_session(t0);
    fail(&mut scheduler, first, t0);
    assert_eq!(scheduler.retry_at(), Some(t0 + secs(2)));

    // A resync fails before the retry fires: the retry moves, it isn't duplicated
    let resync = scheduler.trigger_resync().unwrap();
    fail(&mut scheduler, resync, t0 + secs(1));
    assert_eq!(scheduler.retry_at(), Some(t0 + secs(1) + secs(4)));
    assert_eq!(scheduler.next_deadline(), scheduler.retry_at());
}

#[test]
fn test_permanent_error_is_not_retried() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(no_burst());

    let first = scheduler.start_session(t0);
    fail(&mut scheduler, first, t0);
    let retry = scheduler.on_timer(t0 + secs(2)).unwrap();
    scheduler.on_fetch_result(retry.seq, Err(ErrorKind::Permission), t0 + secs(2));

    assert_eq!(scheduler.retry_at(), None);
    assert_eq!(scheduler.state().last_error, Some(ErrorKind::Permission));
    // Indicator keeps reflecting the connectivity streak
    assert_eq!(scheduler.state().consecutive_failures, 1);
    assert_eq!(scheduler.status(), ConnectionStatus::Reconnecting);
}

#[test]
fn test_permanent_error_cancels_pending_retry() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(no_burst());

    let first = scheduler.start_session(t0);
    fail(&mut scheduler, first, t0);
    assert_eq!(scheduler.retry_at(), Some(t0 + secs(2)));

    // A resync lands a permanent error before the retry is due
    let resync = scheduler.trigger_resync().unwrap();
    scheduler.on_fetch_result(resync.seq, Err(ErrorKind::Permission), t0 + secs(1));

    assert_eq!(scheduler.retry_at(), None);
    assert_eq!(scheduler.next_deadline(), None);
    assert_eq!(scheduler.on_timer(t0 + secs(5)), None);
    assert_eq!(scheduler.stats().dispatched, 2);
}

#[test]
fn test_permanent_error_on_first_fetch_keeps_connected() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(no_burst());

    let first = scheduler.start_session(t0);
    scheduler.on_fetch_result(first.seq, Err(ErrorKind::Validation), t0);

    assert_eq!(scheduler.retry_at(), None);
    assert_eq!(scheduler.status(), ConnectionStatus::Connected);
    assert_eq!(scheduler.stats().failed, 1);
}

#[test]
fn test_explicit_resync_rearms_after_disconnect() {
    let t0 = Instant::now();
    let config = SyncConfig {
        retry_max_attempts: 0,
        ..no_burst()
    };
    let mut scheduler = SyncScheduler::new(config);

    let first = scheduler.start_session(t0);
    fail(&mut scheduler, first, t0);
    assert_eq!(scheduler.status(), ConnectionStatus::Disconnected);

    let resync = scheduler.trigger_resync().expect("resync should dispatch");
    assert_eq!(resync.reason, FetchReason::Resync);
    assert_eq!(scheduler.state().consecutive_failures, 0);
    // Nothing has succeeded yet
    assert_eq!(scheduler.status(), ConnectionStatus::Reconnecting);

    let resolution = scheduler.on_fetch_result(resync.seq, Ok(()), t0 + secs(1));
    assert!(resolution.recovered);
    assert_eq!(scheduler.status(), ConnectionStatus::Connected);
}

#[test]
fn test_rearmed_fetch_failing_permanently_stays_reconnecting() {
    let t0 = Instant::now();
    let config = SyncConfig {
        retry_max_attempts: 0,
        ..no_burst()
    };
    let mut scheduler = SyncScheduler::new(config);

    let first = scheduler.start_session(t0);
    fail(&mut scheduler, first, t0);
    let resync = scheduler.trigger_resync().unwrap();
    scheduler.on_fetch_result(resync.seq, Err(ErrorKind::Permission), t0 + secs(1));

    assert_eq!(scheduler.status(), ConnectionStatus::Reconnecting);
    assert_eq!(scheduler.retry_at(), None);
}

#[test]
fn test_rearmed_backoff_starts_over() {
    let t0 = Instant::now();
    let config = SyncConfig {
        retry_max_attempts: 1,
        ..no_burst()
    };
    let mut scheduler = SyncScheduler::new(config);

    let first = scheduler.start_session(t0);
    fail(&mut scheduler, first, t0);
    let retry = scheduler.on_timer(t0 + secs(2)).unwrap();
    fail(&mut scheduler, retry, t0 + secs(2));
    assert_eq!(scheduler.status(), ConnectionStatus::Disconnected);

    let resync = scheduler.trigger_resync().unwrap();
    fail(&mut scheduler, resync, t0 + secs(10));
    assert_eq!(scheduler.retry_at(), Some(t0 + secs(12)));
    assert_eq!(scheduler.status(), ConnectionStatus::Reconnecting);
}

// ============================================================================
// Coalescing
// ============================================================================

#[test]
fn test_resyncs_during_fetch_coalesce_into_one() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(no_burst());

    let first = scheduler.start_session(t0);
    for _ in 0..5 {
        assert_eq!(scheduler.trigger_resync(), None);
        assert_eq!(scheduler.in_flight(), Some(first));
    }

    let follow_up = succeed(&mut scheduler, first, t0).expect("coalesced resync should dispatch");
    assert_eq!(follow_up.reason, FetchReason::Resync);
    assert_eq!(follow_up.seq, first.seq + 1);

    // Nothing else queued behind it
    assert_eq!(succeed(&mut scheduler, follow_up, t0), None);
    assert_eq!(scheduler.in_flight(), None);
    assert_eq!(scheduler.stats().dispatched, 2);
}

#[test]
fn test_burst_tick_during_fetch_is_coalesced() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(SyncConfig::default());

    let first = scheduler.start_session(t0);
    // Initial fetch still running when the first tick is due
    assert_eq!(scheduler.on_timer(t0 + secs(1)), None);
    assert_eq!(scheduler.state().burst_remaining, 8);

    let follow_up = succeed(&mut scheduler, first, t0 + secs(1)).unwrap();
    assert_eq!(follow_up.reason, FetchReason::Burst);
    assert!(scheduler.state().in_flight);
}

#[test]
fn test_burst_tick_behind_coalesced_resync_keeps_its_slot() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(SyncConfig::default());

    let first = scheduler.start_session(t0);
    assert_eq!(scheduler.trigger_resync(), None);
    assert_eq!(scheduler.on_timer(t0 + secs(1)), None);

    // Owed burst fetch goes first, then the resync
    let burst = succeed(&mut scheduler, first, t0 + secs(1)).unwrap();
    assert_eq!(burst.reason, FetchReason::Burst);
    let resync = succeed(&mut scheduler, burst, t0 + secs(1)).unwrap();
    assert_eq!(resync.reason, FetchReason::Resync);
    assert_eq!(succeed(&mut scheduler, resync, t0 + secs(1)), None);

    while let Some(deadline) = scheduler.next_deadline() {
        let request = scheduler.on_timer(deadline).unwrap();
        succeed(&mut scheduler, request, deadline);
    }

    assert_eq!(scheduler.burst_progress().completed, 10);
    assert_eq!(scheduler.burst_progress().total, 10);
    assert_eq!(scheduler.stats().dispatched, 11);
}

#[test]
fn test_ticks_piling_up_behind_slow_fetch_are_each_issued() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(SyncConfig::default());

    let first = scheduler.start_session(t0);
    assert_eq!(scheduler.on_timer(t0 + secs(1)), None);
    assert_eq!(scheduler.on_timer(t0 + secs(2)), None);
    assert_eq!(scheduler.state().burst_remaining, 7);

    let second = succeed(&mut scheduler, first, t0 + secs(2)).unwrap();
    let third = succeed(&mut scheduler, second, t0 + secs(2)).unwrap();
    assert_eq!(third.reason, FetchReason::Burst);
    assert_eq!(succeed(&mut scheduler, third, t0 + secs(2)), None);
    assert_eq!(scheduler.burst_progress().completed, 3);
}

#[test]
fn test_retry_due_during_successful_fetch_is_dropped() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(no_burst());

    let first = scheduler.start_session(t0);
    fail(&mut scheduler, first, t0);
    let resync = scheduler.trigger_resync().unwrap();
    // Retry comes due while the resync is still running
    assert_eq!(scheduler.on_timer(t0 + secs(2)), None);

    assert_eq!(succeed(&mut scheduler, resync, t0 + secs(3)), None);
    assert_eq!(scheduler.stats().dispatched, 2);
}

#[test]
fn test_resync_is_issued_immediately_when_idle() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(no_burst());
    let first = scheduler.start_session(t0);
    succeed(&mut scheduler, first, t0);

    let resync = scheduler.trigger_resync().unwrap();
    assert_eq!(resync.reason, FetchReason::Resync);
    // Resyncs are not part of the burst
    succeed(&mut scheduler, resync, t0);
    assert_eq!(scheduler.burst_progress().completed, 1);
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[test]
fn test_result_for_unknown_seq_is_rejected() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(no_burst());
    let first = scheduler.start_session(t0);

    let resolution = scheduler.on_fetch_result(first.seq + 7, Ok(()), t0);
    assert!(!resolution.accepted);
    assert_eq!(scheduler.in_flight(), Some(first));
}

#[test]
fn test_result_from_ended_session_is_rejected() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(SyncConfig::default());

    let old = scheduler.start_session(t0);
    scheduler.end_session();
    assert!(!scheduler.is_active());
    assert_eq!(scheduler.next_deadline(), None);

    let new = scheduler.start_session(t0 + secs(1));
    assert!(new.seq > old.seq);

    let stale = scheduler.on_fetch_result(old.seq, Err(ErrorKind::Connectivity), t0 + secs(1));
    assert!(!stale.accepted);
    assert_eq!(scheduler.state().consecutive_failures, 0);
    assert!(scheduler.on_fetch_result(new.seq, Ok(()), t0 + secs(1)).accepted);
}

#[test]
fn test_triggers_without_session_do_nothing() {
    let mut scheduler = SyncScheduler::new(SyncConfig::default());
    assert_eq!(scheduler.trigger_resync(), None);
    assert_eq!(scheduler.on_timer(Instant::now()), None);
    assert_eq!(scheduler.burst_progress().total, 0);
}

#[test]
fn test_plain_success_is_not_a_recovery() {
    let t0 = Instant::now();
    let mut scheduler = SyncScheduler::new(no_burst());
    let first = scheduler.start_session(t0);
    assert!(!scheduler.on_fetch_result(first.seq, Ok(()), t0).recovered);
}
