//! Per-thread timer queues and the idle callback queue.
//!
//! Each thread that runs a scheduler owns one `TimerQueues`: two independent
//! insertion-sorted lists, one for monotonic ("after ms") timers and one for
//! wall-clock ("after at") timers, plus one `IdleQueue`. The two lists are
//! kept separate because their deadlines live on different numeric scales
//! (small counts of microseconds since process start vs. Unix-epoch
//! microseconds) - a single merged sort order would compare values that
//! have no common meaning. Timers are never shared across threads; a timer
//! created on one thread only ever fires by that thread calling
//! `service_timers`.
//!
//! Ordering keeps ties in arrival order within each queue: a new entry is
//! inserted just before the first existing entry with a strictly later
//! deadline, so two timers due at the same microsecond fire in the order
//! they were scheduled.
//!
//! A service pass only fires timers whose token was allocated before the
//! pass began (the "fence"), shared across both queues so ordering between
//! them stays consistent with a single fence. A callback that reschedules
//! itself for time zero is deferred to the next pass instead of looping
//! forever within one.

pub mod idle;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rtevent_core::ids::TimerToken;

pub use idle::IdleQueue;

/// Which clock a timer's deadline is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Relative delay measured against the monotonic clock. Immune to wall
    /// clock adjustments.
    Monotonic,
    /// Absolute deadline measured against the wall clock. Fires early or
    /// late if the wall clock is stepped, same as the original `after at`.
    WallClock,
}

type TimerCallback = Box<dyn FnMut() + Send>;

struct TimerEntry {
    token: TimerToken,
    deadline_us: i64,
    callback: Mutex<Option<TimerCallback>>,
}

/// Earliest pending deadline on each clock, as reported by `next_deadline`.
/// The two fields are not comparable to each other - each is only
/// meaningful against a reading of its own clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextDeadlines {
    pub monotonic_us: Option<i64>,
    pub wallclock_us: Option<i64>,
}

fn insert_sorted(entries: &mut Vec<TimerEntry>, entry: TimerEntry) {
    let pos = entries
        .iter()
        .position(|e| e.deadline_us > entry.deadline_us)
        .unwrap_or(entries.len());
    entries.insert(pos, entry);
}

fn service_one(entries: &Mutex<Vec<TimerEntry>>, fence: u64, now: i64) -> usize {
    let mut fired = 0usize;
    loop {
        let due = {
            let guard = entries.lock().unwrap();
            guard.iter().position(|e| e.token.as_u64() < fence && e.deadline_us <= now)
        };
        let Some(pos) = due else { break };

        let callback = {
            let mut guard = entries.lock().unwrap();
            let entry = guard.remove(pos);
            entry.callback.into_inner().unwrap()
        };
        if let Some(mut cb) = callback {
            cb();
            fired += 1;
        }
    }
    fired
}

/// A thread-local pair of timer queues, one per clock kind.
pub struct TimerQueues {
    monotonic: Mutex<Vec<TimerEntry>>,
    wallclock: Mutex<Vec<TimerEntry>>,
    next_token: AtomicU64,
}

impl TimerQueues {
    pub fn new() -> Self {
        Self {
            monotonic: Mutex::new(Vec::new()),
            wallclock: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(0),
        }
    }

    fn alloc_token(&self) -> TimerToken {
        TimerToken::new(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// Current token counter value, used as the fence for a service pass
    /// about to start: only tokens allocated strictly before this value are
    /// eligible to fire in that pass.
    fn fence(&self) -> u64 {
        self.next_token.load(Ordering::Relaxed)
    }

    fn queue_for(&self, kind: TimerKind) -> &Mutex<Vec<TimerEntry>> {
        match kind {
            TimerKind::Monotonic => &self.monotonic,
            TimerKind::WallClock => &self.wallclock,
        }
    }

    /// Schedule a timer with an absolute deadline in microseconds on the
    /// clock named by `kind`. Returns the token used to cancel it.
    pub fn schedule(
        &self,
        deadline_us: i64,
        kind: TimerKind,
        callback: impl FnMut() + Send + 'static,
    ) -> TimerToken {
        let token = self.alloc_token();
        let entry = TimerEntry { token, deadline_us, callback: Mutex::new(Some(Box::new(callback))) };
        insert_sorted(&mut self.queue_for(kind).lock().unwrap(), entry);
        token
    }

    /// Cancel a pending timer. Returns `true` if it was found and removed
    /// before firing.
    pub fn cancel(&self, token: TimerToken) -> bool {
        for queue in [&self.monotonic, &self.wallclock] {
            let mut entries = queue.lock().unwrap();
            if let Some(pos) = entries.iter().position(|e| e.token == token) {
                entries.remove(pos);
                return true;
            }
        }
        false
    }

    /// Earliest pending deadline on each clock, or `None` for a clock with
    /// nothing queued. Per-kind: the two values are on different clocks and
    /// must not be compared to each other directly, only against a reading
    /// of their own clock.
    pub fn next_deadline(&self) -> NextDeadlines {
        NextDeadlines {
            monotonic_us: self.monotonic.lock().unwrap().first().map(|e| e.deadline_us),
            wallclock_us: self.wallclock.lock().unwrap().first().map(|e| e.deadline_us),
        }
    }

    pub fn len(&self) -> usize {
        self.monotonic.lock().unwrap().len() + self.wallclock.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `token` is still pending (not yet fired or cancelled).
    pub fn contains(&self, token: TimerToken) -> bool {
        self.monotonic.lock().unwrap().iter().any(|e| e.token == token)
            || self.wallclock.lock().unwrap().iter().any(|e| e.token == token)
    }

    /// Fire every timer due at or before `mono_now`/`wall_now` that was
    /// scheduled before this pass began. Returns the number fired.
    ///
    /// Each callback runs with its queue unlocked, so it may itself
    /// schedule or cancel timers without deadlocking; any timer it creates
    /// gets a token past the fence and so waits for the next pass. Both
    /// queues share the one fence captured at the start of the pass.
    pub fn service(&self, mono_now: i64, wall_now: i64) -> usize {
        let fence = self.fence();
        service_one(&self.monotonic, fence, mono_now) + service_one(&self.wallclock, fence, wall_now)
    }
}

impl Default for TimerQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_insert_keeps_stable_order_for_ties() {
        let q = TimerQueues::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            q.schedule(100, TimerKind::Monotonic, move || order.lock().unwrap().push(i));
        }
        q.service(100, 0);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let q = TimerQueues::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let token = q.schedule(0, TimerKind::Monotonic, move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        assert!(q.cancel(token));
        q.service(100, 100);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reschedule_from_callback_waits_for_next_pass() {
        let q = Arc::new(TimerQueues::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let q2 = q.clone();
        let fired2 = fired.clone();
        q.schedule(0, TimerKind::Monotonic, move || {
            fired2.fetch_add(1, Ordering::SeqCst);
            let fired3 = fired2.clone();
            q2.schedule(0, TimerKind::Monotonic, move || {
                fired3.fetch_add(1, Ordering::SeqCst);
            });
        });
        let fired_this_pass = q.service(0, 0);
        assert_eq!(fired_this_pass, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let fired_next_pass = q.service(0, 0);
        assert_eq!(fired_next_pass, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wallclock_and_monotonic_independent() {
        let q = TimerQueues::new();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let f1 = fired.clone();
        q.schedule(50, TimerKind::Monotonic, move || f1.lock().unwrap().push("mono"));
        let f2 = fired.clone();
        q.schedule(50, TimerKind::WallClock, move || f2.lock().unwrap().push("wall"));
        q.service(100, 0);
        assert_eq!(*fired.lock().unwrap(), vec!["mono"]);
        q.service(100, 100);
        assert_eq!(*fired.lock().unwrap(), vec!["mono", "wall"]);
    }

    #[test]
    fn test_next_deadline_reports_earliest_per_kind() {
        let q = TimerQueues::new();
        q.schedule(500, TimerKind::Monotonic, || {});
        q.schedule(100, TimerKind::Monotonic, || {});
        assert_eq!(q.next_deadline(), NextDeadlines { monotonic_us: Some(100), wallclock_us: None });

        q.schedule(9_000, TimerKind::WallClock, || {});
        assert_eq!(q.next_deadline(), NextDeadlines { monotonic_us: Some(100), wallclock_us: Some(9_000) });
    }
}
