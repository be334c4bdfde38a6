//! Cooperative blocking sleep engine.
//!
//! `sleep_monotonic`/`sleep_wallclock` block the calling thread in slices no
//! longer than `RuntimeConfig::max_sleep_slice`, rechecking a `LimitToken`
//! between slices so cancellation and wall-clock resource limits take
//! effect within one slice of being set rather than only after the full
//! sleep duration elapses. A slice is also capped by the token's remaining
//! limit time, so a limit due to expire soon is still caught promptly even
//! with a long `max_sleep_slice`.
//!
//! Slices at or below `recheck_skip_threshold` skip the following
//! iteration's limit check, trading a one-slice delay in cancellation
//! responsiveness for one fewer atomic load per very short sleep - the
//! loop's dominant cost at that granularity. The skip never arms when the
//! limit's own remaining time is what made the slice short: that's exactly
//! the case the recheck exists to catch promptly, so a slice clamped by an
//! about-to-fire limit always rechecks on the next iteration instead.

use std::thread;
use std::time::{Duration, Instant};

use rtevent_core::error::EventResult;
use rtevent_core::limit::LimitToken;

use crate::async_registry;
use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::tls;

/// Run any async handlers already marked ready on this thread. The delay
/// loop calls this at the top of every iteration so a handler that fires
/// during a sleep runs promptly rather than waiting for the sleep to end.
fn service_ready_async() {
    if tls::current().is_ready() {
        async_registry::invoke();
    }
}

/// Block until `duration` has elapsed on the monotonic clock, or return
/// early with an error if `limit` cancels or its deadline passes first.
pub fn sleep_monotonic(duration: Duration, limit: &LimitToken, config: &RuntimeConfig) -> EventResult<()> {
    let deadline = Instant::now() + duration;
    loop {
        service_ready_async();

        if !limit.take_recheck_skip() {
            limit.check()?;
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }

        let slice = pick_slice(deadline - now, limit, config);
        thread::sleep(slice);
    }
}

/// Block until the wall clock reaches `deadline_us` microseconds, or return
/// early if `limit` cancels or its deadline passes first.
pub fn sleep_wallclock(
    deadline_us: i64,
    clock: &Clock,
    limit: &LimitToken,
    config: &RuntimeConfig,
) -> EventResult<()> {
    loop {
        service_ready_async();

        if !limit.take_recheck_skip() {
            limit.check()?;
        }

        let now_us = clock.wall_now();
        if now_us >= deadline_us {
            return Ok(());
        }

        let remaining = Duration::from_micros((deadline_us - now_us) as u64);
        let slice = pick_slice(remaining, limit, config);
        thread::sleep(slice);
    }
}

fn pick_slice(remaining: Duration, limit: &LimitToken, config: &RuntimeConfig) -> Duration {
    let mut slice = remaining.min(config.max_sleep_slice);
    let mut clamped_by_limit = false;
    if let Some(limit_remaining) = limit.limit_remaining() {
        let limit_slice = limit_remaining.max(Duration::from_micros(1));
        if limit_slice <= slice {
            slice = limit_slice;
            clamped_by_limit = true;
        }
    }
    // A slice shortened because the limit itself is about to fire must not
    // skip next iteration's check - that's the one case the skip exists to
    // still catch promptly. Only a short slice from `max_sleep_slice` or the
    // remaining distance to the sleep's own deadline is free to skip.
    if !clamped_by_limit && slice <= config.recheck_skip_threshold {
        limit.reset_recheck_skip(1);
    }
    slice
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_monotonic_returns_after_duration() {
        let limit = LimitToken::new();
        let config = RuntimeConfig::new();
        let start = Instant::now();
        sleep_monotonic(Duration::from_millis(10), &limit, &config).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_sleep_monotonic_cancelled_returns_early() {
        let limit = LimitToken::new();
        let config = RuntimeConfig::new().max_sleep_slice(Duration::from_secs(10));
        let limit2 = limit.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            limit2.cancel();
        });
        let start = Instant::now();
        let result = sleep_monotonic(Duration::from_secs(60), &limit, &config);
        handle.join().unwrap();
        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_sleep_wallclock_honors_limit_deadline() {
        let limit = LimitToken::new();
        limit.set_limit(Some(Duration::from_millis(5)));
        let config = RuntimeConfig::new().max_sleep_slice(Duration::from_secs(10));
        let clock = Clock::new();
        let far_future = clock.wall_now() + Duration::from_secs(60).as_micros() as i64;
        let result = sleep_wallclock(far_future, &clock, &limit, &config);
        assert!(result.is_err());
    }
}
