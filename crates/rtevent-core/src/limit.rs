//! Interpreter cancellation and wall-clock resource limit checking
//!
//! The delay engine (`rtevent-runtime::delay`) checks a `LimitToken` on every
//! iteration of its cooperative sleep loop: cancellation aborts immediately,
//! a wall-clock limit aborts once its deadline passes, and otherwise the
//! remaining-limit time caps how long a single sleep slice may be so that a
//! near-due limit still gets checked promptly.

use core::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use crate::error::{EventError, EventResult};

static LIMIT_EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

fn epoch() -> Instant {
    *LIMIT_EPOCH.get_or_init(Instant::now)
}

fn now_ns() -> i64 {
    epoch().elapsed().as_nanos() as i64
}

/// No limit set, sentinel stored in the atomic deadline field.
const NO_LIMIT: i64 = i64::MAX;

/// Cooperative cancellation plus an optional wall-clock deadline.
///
/// Cheap to clone; clones share the same underlying flags. `child()` builds
/// a token whose cancellation also observes its parent's, mirroring how an
/// interpreter's resource limit applies to nested interpreters.
#[derive(Clone)]
pub struct LimitToken {
    inner: Arc<Inner>,
    parent: Option<Box<LimitToken>>,
}

struct Inner {
    cancelled: AtomicBool,
    limit_deadline_ns: AtomicI64,
    /// Iterations the delay loop may skip a limit re-check after a short sleep.
    recheck_skip_remaining: AtomicI64,
}

impl LimitToken {
    /// A token that never cancels and has no limit.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                limit_deadline_ns: AtomicI64::new(NO_LIMIT),
                recheck_skip_remaining: AtomicI64::new(0),
            }),
            parent: None,
        }
    }

    /// A child token: cancelling the parent is visible through the child,
    /// but cancelling the child does not affect the parent.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                limit_deadline_ns: AtomicI64::new(NO_LIMIT),
                recheck_skip_remaining: AtomicI64::new(0),
            }),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return true;
        }
        self.parent.as_deref().is_some_and(LimitToken::is_cancelled)
    }

    /// Set (or clear, with `None`) a wall-clock deadline measured from now.
    pub fn set_limit(&self, remaining: Option<Duration>) {
        let deadline = match remaining {
            Some(d) => now_ns().saturating_add(d.as_nanos() as i64),
            None => NO_LIMIT,
        };
        self.inner.limit_deadline_ns.store(deadline, Ordering::Release);
    }

    fn own_limit_remaining(&self) -> Option<Duration> {
        let deadline = self.inner.limit_deadline_ns.load(Ordering::Acquire);
        if deadline == NO_LIMIT {
            return None;
        }
        let remaining_ns = deadline - now_ns();
        Some(Duration::from_nanos(remaining_ns.max(0) as u64))
    }

    /// Time left before the nearest limit (own or inherited) fires, if any.
    pub fn limit_remaining(&self) -> Option<Duration> {
        let own = self.own_limit_remaining();
        let parent = self.parent.as_deref().and_then(LimitToken::limit_remaining);
        match (own, parent) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, None) => a,
            (None, b) => b,
        }
    }

    fn own_limit_exceeded(&self) -> bool {
        let deadline = self.inner.limit_deadline_ns.load(Ordering::Acquire);
        deadline != NO_LIMIT && now_ns() >= deadline
    }

    pub fn limit_exceeded(&self) -> bool {
        self.own_limit_exceeded()
            || self.parent.as_deref().is_some_and(LimitToken::limit_exceeded)
    }

    /// Reset the granularity ticker that lets the delay loop skip a
    /// recheck after very short sleep slices.
    pub fn reset_recheck_skip(&self, iterations: i64) {
        self.inner.recheck_skip_remaining.store(iterations, Ordering::Relaxed);
    }

    pub fn take_recheck_skip(&self) -> bool {
        let prev = self.inner.recheck_skip_remaining.fetch_sub(1, Ordering::Relaxed);
        prev > 0
    }

    /// Cancellation check returning the core's error type.
    #[inline]
    pub fn check(&self) -> EventResult<()> {
        if self.is_cancelled() {
            Err(EventError::Cancelled)
        } else if self.limit_exceeded() {
            Err(EventError::LimitExceeded)
        } else {
            Ok(())
        }
    }
}

impl Default for LimitToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LimitToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitToken")
            .field("cancelled", &self.is_cancelled())
            .field("limit_remaining", &self.limit_remaining())
            .finish()
    }
}
