//! Per-thread event scheduler: the object the command surface operates on.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rtevent_core::ids::{AfterId, TimerToken};
use rtevent_core::{EventError, EventResult, LimitToken};
use rtevent_runtime::{Clock, IdleQueue, Notifier, RuntimeConfig, TimerKind, TimerQueues};

/// What kind of queue an after-record lives on, for `after info`/`timer info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterEntryKind {
    Monotonic,
    WallClock,
    Idle,
}

struct AfterEntry {
    kind: AfterEntryKind,
    token: TimerToken,
    label: String,
    /// Deadline in microseconds on the entry's own clock, `None` for idle
    /// entries (which have no deadline to report).
    deadline_us: Option<i64>,
}

/// An entry's description for `after info`/`timer info`. `after info`
/// collapses both timer kinds to `"timer"`; `timer info` distinguishes
/// them and reports the deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDescription {
    pub command: String,
    pub kind: AfterEntryKind,
    pub deadline_us: Option<i64>,
}

impl EntryDescription {
    /// The two-element `{command kind}` form `after info <id>` reports:
    /// `"timer"` for either timer kind, `"idle"` for idle entries.
    pub fn after_info_words(&self) -> (String, &'static str) {
        let kind = match self.kind {
            AfterEntryKind::Monotonic | AfterEntryKind::WallClock => "timer",
            AfterEntryKind::Idle => "idle",
        };
        (self.command.clone(), kind)
    }

    /// The `timer info <id>` form: `{command monotonic us}`,
    /// `{command wallclock us}`, or `{command idle}`.
    pub fn timer_info_words(&self) -> (String, &'static str, Option<i64>) {
        match self.kind {
            AfterEntryKind::Monotonic => (self.command.clone(), "monotonic", self.deadline_us),
            AfterEntryKind::WallClock => (self.command.clone(), "wallclock", self.deadline_us),
            AfterEntryKind::Idle => (self.command.clone(), "idle", None),
        }
    }
}

/// Ties one thread's clock, timer queues, idle queue, and async registry
/// together behind the `after`/`timer` command surface.
///
/// Not `Send`/`Sync`: a scheduler's queues belong to exactly one thread, the
/// same restriction the timer and idle queues themselves carry.
pub struct EventScheduler {
    clock: Clock,
    timers: TimerQueues,
    idle: IdleQueue,
    config: RuntimeConfig,
    limit: LimitToken,
    after_ids: Mutex<HashMap<u64, AfterEntry>>,
    next_after_id: AtomicI64,
    notifier: Arc<Notifier>,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self {
            clock: Clock::new(),
            timers: TimerQueues::new(),
            idle: IdleQueue::new(),
            config: RuntimeConfig::from_env(),
            limit: LimitToken::new(),
            after_ids: Mutex::new(HashMap::new()),
            next_after_id: AtomicI64::new(1),
            notifier: Notifier::new().expect("failed to create eventfd notifier"),
        }
    }

    pub fn limit_token(&self) -> &LimitToken {
        &self.limit
    }

    fn alloc_after_id(&self) -> AfterId {
        AfterId::new(self.next_after_id.fetch_add(1, Ordering::Relaxed) as u64)
    }

    /// Schedule `callback` to run after `ms` milliseconds on the monotonic
    /// clock. Equivalent to `after <N> script`. `command` is the script
    /// text being scheduled, kept for `info`/`cancel script` matching.
    pub fn after_ms(
        &self,
        ms: u64,
        command: impl Into<String>,
        callback: impl FnMut() + Send + 'static,
    ) -> EventResult<AfterId> {
        self.after_monotonic_us(
            (ms as i64)
                .checked_mul(1_000)
                .ok_or(EventError::TimeTooFar)?,
            command,
            callback,
        )
    }

    /// Schedule `callback` to run after `delay_us` microseconds on the
    /// monotonic clock. Equivalent to `timer in <T> <unit> script`.
    pub fn after_monotonic_us(
        &self,
        delay_us: i64,
        command: impl Into<String>,
        callback: impl FnMut() + Send + 'static,
    ) -> EventResult<AfterId> {
        let now = self.clock.monotonic_now();
        let deadline = now.checked_add(delay_us).ok_or(EventError::TimeTooFar)?;
        let after_id = self.alloc_after_id();
        let after_u64 = after_id.as_u64();
        let token = self.timers.schedule(deadline, TimerKind::Monotonic, callback);
        self.after_ids.lock().unwrap().insert(
            after_u64,
            AfterEntry {
                kind: AfterEntryKind::Monotonic,
                token,
                label: command.into(),
                deadline_us: Some(deadline),
            },
        );
        Ok(after_id)
    }

    /// Schedule `callback` to run at an absolute wall-clock deadline.
    /// Equivalent to `timer at <T> <unit> script`.
    pub fn at_wallclock_us(
        &self,
        deadline_us: i64,
        command: impl Into<String>,
        callback: impl FnMut() + Send + 'static,
    ) -> EventResult<AfterId> {
        let after_id = self.alloc_after_id();
        let after_u64 = after_id.as_u64();
        let token = self.timers.schedule(deadline_us, TimerKind::WallClock, callback);
        self.after_ids.lock().unwrap().insert(
            after_u64,
            AfterEntry {
                kind: AfterEntryKind::WallClock,
                token,
                label: command.into(),
                deadline_us: Some(deadline_us),
            },
        );
        Ok(after_id)
    }

    /// Enqueue `callback` on the idle queue. Equivalent to `after idle
    /// script` / `timer idle script`.
    pub fn idle(&self, command: impl Into<String>, callback: impl FnMut() + Send + 'static) -> AfterId {
        let after_id = self.alloc_after_id();
        let token = self.idle.queue(callback);
        self.after_ids.lock().unwrap().insert(
            after_id.as_u64(),
            AfterEntry {
                kind: AfterEntryKind::Idle,
                token,
                label: command.into(),
                deadline_us: None,
            },
        );
        after_id
    }

    /// Cancel by id. Returns `Ok(true)` if something was cancelled, `Ok(false)`
    /// if the id is unknown (the `after cancel` form is silent on no-match;
    /// callers implementing `timer cancel` turn `false` into an error).
    pub fn cancel_id(&self, id: AfterId) -> bool {
        let entry = self.after_ids.lock().unwrap().remove(&id.as_u64());
        match entry {
            Some(entry) => match entry.kind {
                AfterEntryKind::Idle => self.idle.cancel(entry.token),
                AfterEntryKind::Monotonic | AfterEntryKind::WallClock => self.timers.cancel(entry.token),
            },
            None => false,
        }
    }

    /// Cancel by the literal script text that was scheduled, matching any
    /// number of entries (mirrors the idle queue's mass-cancel-by-value
    /// semantics extended across all three queues for the `after cancel
    /// script` form).
    pub fn cancel_matching(&self, script: &str) -> bool {
        let ids: Vec<u64> = self
            .after_ids
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| e.label == script)
            .map(|(id, _)| *id)
            .collect();
        let mut any = false;
        for id in ids {
            if self.cancel_id(AfterId::new(id)) {
                any = true;
            }
        }
        any
    }

    /// All currently pending ids, for `after info`/`timer info` with no
    /// argument.
    pub fn pending_ids(&self) -> Vec<AfterId> {
        self.after_ids.lock().unwrap().keys().map(|id| AfterId::new(*id)).collect()
    }

    /// The kind of a pending id's queue, for callers that only need the
    /// queue family, not a full description.
    pub fn entry_kind(&self, id: AfterId) -> EventResult<AfterEntryKind> {
        self.after_ids
            .lock()
            .unwrap()
            .get(&id.as_u64())
            .map(|e| e.kind)
            .ok_or_else(|| EventError::NoSuchEvent(id.to_tag()))
    }

    /// Full description of a pending id, for `after info <id>`/`timer info
    /// <id>`: the scheduled command text, its queue kind, and its deadline
    /// (idle entries have none).
    pub fn describe(&self, id: AfterId) -> EventResult<EntryDescription> {
        self.after_ids
            .lock()
            .unwrap()
            .get(&id.as_u64())
            .map(|e| EntryDescription {
                command: e.label.clone(),
                kind: e.kind,
                deadline_us: e.deadline_us,
            })
            .ok_or_else(|| EventError::NoSuchEvent(id.to_tag()))
    }

    /// Block the calling thread for `duration`, servicing ready async
    /// handlers and honoring cancellation/limits. Equivalent to `timer
    /// sleep for`.
    pub fn sleep_for(&self, duration: std::time::Duration) -> EventResult<()> {
        rtevent_runtime::sleep_monotonic(duration, &self.limit, &self.config)
    }

    /// Block the calling thread until the wall clock reaches `deadline_us`.
    /// Equivalent to `timer sleep until`.
    pub fn sleep_until(&self, deadline_us: i64) -> EventResult<()> {
        rtevent_runtime::sleep_wallclock(deadline_us, &self.clock, &self.limit, &self.config)
    }

    /// Fire every timer and idle callback currently due. Returns the number
    /// of callbacks run. Drives the host's event loop integration point
    /// without requiring a notifier/eventfd (e.g. a host that already polls
    /// on its own schedule can call this directly).
    pub fn drain_due(&self) -> usize {
        let mono_now = self.clock.monotonic_now();
        let wall_now = self.clock.wall_now();
        let fired = self.timers.service(mono_now, wall_now);
        rtevent_runtime::AsyncRegistry::invoke();
        let idled = if fired == 0 { self.idle.run_pending() } else { 0 };
        self.prune_finished();
        fired + idled
    }

    /// The notifier's fd to add to the embedder's `poll`/`select` readable
    /// set, and how long the embedder may block on it: zero if idle work is
    /// pending, the nearest timer deadline across both queues otherwise, or
    /// indefinitely if nothing is pending at all.
    pub fn setup_proc(&self) -> (RawFd, Option<Duration>) {
        let mono_now = self.clock.monotonic_now();
        let wall_now = self.clock.wall_now();
        self.notifier.setup_proc(&self.timers, &self.idle, mono_now, wall_now)
    }

    /// Drain the notifier's eventfd and run every timer, idle, and async
    /// callback currently due. Call once the embedder's poll reports the
    /// `setup_proc` fd readable. Returns the number of callbacks run.
    pub fn check_proc(&self) -> usize {
        let mono_now = self.clock.monotonic_now();
        let wall_now = self.clock.wall_now();
        let ran = self.notifier.check_proc(&self.timers, &self.idle, mono_now, wall_now);
        self.prune_finished();
        ran
    }

    /// Drop after-records whose underlying timer/idle entry has already
    /// fired or been cancelled, keeping `pending_ids`/`describe` in sync
    /// with the queues after a service pass.
    fn prune_finished(&self) {
        self.after_ids.lock().unwrap().retain(|_, e| match e.kind {
            AfterEntryKind::Idle => self.idle.contains(e.token),
            AfterEntryKind::Monotonic | AfterEntryKind::WallClock => self.timers.contains(e.token),
        });
    }

    pub fn wall_now(&self) -> i64 {
        self.clock.wall_now()
    }

    pub fn monotonic_now(&self) -> i64 {
        self.clock.monotonic_now()
    }
}

impl Default for EventScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_after_ms_fires_and_is_removed_from_pending() {
        let scheduler = EventScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let id = scheduler
            .after_ms(0, "tick", move || fired2.store(true, Ordering::SeqCst))
            .unwrap();
        assert!(scheduler.pending_ids().contains(&id));
        std::thread::sleep(Duration::from_millis(1));
        scheduler.drain_due();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_by_id_prevents_firing() {
        let scheduler = EventScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let id = scheduler
            .after_ms(0, "tick", move || fired2.store(true, Ordering::SeqCst))
            .unwrap();
        assert!(scheduler.cancel_id(id));
        std::thread::sleep(Duration::from_millis(1));
        scheduler.drain_due();
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_unknown_id_returns_false() {
        let scheduler = EventScheduler::new();
        assert!(!scheduler.cancel_id(AfterId::new(999)));
    }

    #[test]
    fn test_cancel_matching_by_script_text() {
        let scheduler = EventScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        scheduler
            .after_ms(1000, "puts hi", move || fired2.store(true, Ordering::SeqCst))
            .unwrap();
        assert!(scheduler.cancel_matching("puts hi"));
        assert!(!scheduler.cancel_matching("puts hi"), "already cancelled, nothing left to match");
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_idle_runs_after_timers_drained() {
        let scheduler = EventScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        scheduler.idle("idle work", move || o1.lock().unwrap().push("idle"));
        let o2 = order.clone();
        scheduler
            .after_ms(0, "tick", move || o2.lock().unwrap().push("timer"))
            .unwrap();
        std::thread::sleep(Duration::from_millis(1));
        scheduler.drain_due();
        scheduler.drain_due();
        assert!(order.lock().unwrap().contains(&"timer"));
    }

    #[test]
    fn test_entry_kind_reports_monotonic() {
        let scheduler = EventScheduler::new();
        let id = scheduler.after_ms(1000, "tick", || {}).unwrap();
        assert_eq!(scheduler.entry_kind(id).unwrap(), AfterEntryKind::Monotonic);
    }

    #[test]
    fn test_describe_after_info_words_collapse_timer_kinds() {
        let scheduler = EventScheduler::new();
        let mono_id = scheduler.after_ms(1000, "tick mono", || {}).unwrap();
        let wall_deadline = scheduler.wall_now() + 1_000_000;
        let wall_id = scheduler.at_wallclock_us(wall_deadline, "tick wall", || {}).unwrap();
        let idle_id = scheduler.idle("idle work", || {});

        assert_eq!(
            scheduler.describe(mono_id).unwrap().after_info_words(),
            ("tick mono".to_string(), "timer")
        );
        assert_eq!(
            scheduler.describe(wall_id).unwrap().after_info_words(),
            ("tick wall".to_string(), "timer")
        );
        assert_eq!(
            scheduler.describe(idle_id).unwrap().after_info_words(),
            ("idle work".to_string(), "idle")
        );
    }

    #[test]
    fn test_describe_timer_info_words_distinguish_clocks() {
        let scheduler = EventScheduler::new();
        let mono_id = scheduler.after_ms(1000, "tick mono", || {}).unwrap();
        let wall_deadline = scheduler.wall_now() + 1_000_000;
        let wall_id = scheduler.at_wallclock_us(wall_deadline, "tick wall", || {}).unwrap();

        let (cmd, kind, deadline) = scheduler.describe(mono_id).unwrap().timer_info_words();
        assert_eq!(cmd, "tick mono");
        assert_eq!(kind, "monotonic");
        assert!(deadline.is_some());

        let (cmd, kind, deadline) = scheduler.describe(wall_id).unwrap().timer_info_words();
        assert_eq!(cmd, "tick wall");
        assert_eq!(kind, "wallclock");
        assert_eq!(deadline, Some(wall_deadline));
    }

    #[test]
    fn test_describe_unknown_id_errors() {
        let scheduler = EventScheduler::new();
        assert!(scheduler.describe(AfterId::new(999)).is_err());
    }

    #[test]
    fn test_setup_proc_blocks_indefinitely_with_nothing_pending() {
        let scheduler = EventScheduler::new();
        let (_fd, wait) = scheduler.setup_proc();
        assert_eq!(wait, None);
    }

    #[test]
    fn test_setup_proc_reports_zero_wait_with_idle_pending() {
        let scheduler = EventScheduler::new();
        scheduler.idle("idle work", || {});
        let (_fd, wait) = scheduler.setup_proc();
        assert_eq!(wait, Some(Duration::from_micros(0)));
    }

    #[test]
    fn test_check_proc_fires_due_timer_and_prunes_pending() {
        let scheduler = EventScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let id = scheduler
            .after_ms(0, "tick", move || fired2.store(true, Ordering::SeqCst))
            .unwrap();
        std::thread::sleep(Duration::from_millis(1));
        scheduler.check_proc();
        assert!(fired.load(Ordering::SeqCst));
        assert!(!scheduler.pending_ids().contains(&id));
    }
}
