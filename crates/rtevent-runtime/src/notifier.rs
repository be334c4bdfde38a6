//! Eventfd notifier tying the scheduler into an outer `poll`/`select` loop.
//!
//! Embeddings that already run their own event loop (a GUI message pump, an
//! io_uring reactor) need a way to learn "something in the timer/async core
//! became ready" without the core taking over the loop itself. A notifier
//! owns one eventfd: `setup_proc` hands the embedder the fd to poll for
//! readability along with how long it may block (zero if idle work is
//! pending, the nearest timer deadline otherwise, or indefinitely if
//! nothing is pending at all), and `check_proc` drains it and runs due work
//! once the poll returns.
//!
//! eventfd counter semantics already coalesce repeat wakeups between reads,
//! so `notify_service_timers` needs no separate dedup bookkeeping: a timer
//! armed while a wakeup is already pending just adds to the same counter.

use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

use rtevent_core::rt_warn;

use crate::async_registry;
use crate::timer::{IdleQueue, TimerQueues};

/// One eventfd used to wake a thread blocked in the embedder's poll loop.
pub struct Notifier {
    fd: RawFd,
}

impl Notifier {
    /// Create a notifier and register its fd as the process-wide wake
    /// target for `async_registry::mark_from_signal`.
    pub fn new() -> std::io::Result<Arc<Self>> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        let notifier = Arc::new(Self { fd });
        async_registry::set_wake_fd(fd);
        Ok(notifier)
    }

    /// The fd the embedder should add to its `poll`/`select` readable set,
    /// plus how long the embedder may block waiting for it: `Some(Duration::ZERO)`
    /// if idle work is pending (don't block at all), `Some(d)` for the
    /// per-clock minimum distance to the next timer deadline across both
    /// queues, or `None` to block indefinitely (nothing pending on either
    /// queue or the idle list). `mono_now`/`wall_now` are the caller's clock
    /// readings in microseconds.
    pub fn setup_proc(
        &self,
        timers: &TimerQueues,
        idle: &IdleQueue,
        mono_now: i64,
        wall_now: i64,
    ) -> (RawFd, Option<Duration>) {
        if !idle.is_empty() {
            return (self.fd, Some(Duration::ZERO));
        }

        let next = timers.next_deadline();
        let mono_wait = next.monotonic_us.map(|d| (d - mono_now).max(0));
        let wall_wait = next.wallclock_us.map(|d| (d - wall_now).max(0));
        let wait_us = match (mono_wait, wall_wait) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => None,
        };
        (self.fd, wait_us.map(|us| Duration::from_micros(us as u64)))
    }

    /// Request a wakeup for newly-due timer/idle work.
    pub fn notify_service_timers(&self) {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(self.fd, &val as *const u64 as *const libc::c_void, std::mem::size_of::<u64>())
        };
        if ret < 0 {
            let errno = unsafe { *libc::__errno_location() };
            if errno != libc::EAGAIN {
                rt_warn!("notifier write failed, errno {}", errno);
            }
        }
    }

    /// Drain the eventfd and service due timers, idle callbacks, and async
    /// handlers for the current thread. Call after the embedder's poll
    /// reports the fd readable. `mono_now`/`wall_now` are the caller's
    /// clock readings in microseconds.
    pub fn check_proc(
        &self,
        timers: &TimerQueues,
        idle: &IdleQueue,
        mono_now: i64,
        wall_now: i64,
    ) -> usize {
        self.drain();
        let fired = timers.service(mono_now, wall_now);
        async_registry::invoke();
        let idled = if fired == 0 { idle.run_pending() } else { 0 };
        fired + idled
    }

    fn drain(&self) {
        let mut val: u64 = 0;
        loop {
            let ret = unsafe {
                libc::read(self.fd, &mut val as *mut u64 as *mut libc::c_void, std::mem::size_of::<u64>())
            };
            if ret < 0 {
                let errno = unsafe { *libc::__errno_location() };
                if errno == libc::EINTR {
                    continue;
                }
                // EAGAIN: counter already at zero, nothing more to drain.
                break;
            }
            break;
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe { libc::close(self.fd) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_then_check_services_due_timer() {
        let notifier = Notifier::new().unwrap();
        let timers = TimerQueues::new();
        let idle = IdleQueue::new();
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired2 = fired.clone();
        timers.schedule(0, crate::timer::TimerKind::Monotonic, move || {
            fired2.store(true, std::sync::atomic::Ordering::SeqCst);
        });
        notifier.notify_service_timers();
        notifier.check_proc(&timers, &idle, 100, 100);
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_double_notify_does_not_hang_check_proc() {
        let notifier = Notifier::new().unwrap();
        notifier.notify_service_timers();
        notifier.notify_service_timers();
        let timers = TimerQueues::new();
        let idle = IdleQueue::new();
        notifier.check_proc(&timers, &idle, 0, 0);
    }

    #[test]
    fn test_setup_proc_blocks_indefinitely_when_nothing_pending() {
        let notifier = Notifier::new().unwrap();
        let timers = TimerQueues::new();
        let idle = IdleQueue::new();
        let (_fd, wait) = notifier.setup_proc(&timers, &idle, 0, 0);
        assert_eq!(wait, None);
    }

    #[test]
    fn test_setup_proc_zero_wait_when_idle_pending() {
        let notifier = Notifier::new().unwrap();
        let timers = TimerQueues::new();
        let idle = IdleQueue::new();
        idle.queue(|| {});
        let (_fd, wait) = notifier.setup_proc(&timers, &idle, 0, 0);
        assert_eq!(wait, Some(Duration::ZERO));
    }

    #[test]
    fn test_setup_proc_reports_per_clock_minimum() {
        let notifier = Notifier::new().unwrap();
        let timers = TimerQueues::new();
        let idle = IdleQueue::new();
        timers.schedule(10_000, crate::timer::TimerKind::Monotonic, || {});
        timers.schedule(3_000, crate::timer::TimerKind::WallClock, || {});
        let (_fd, wait) = notifier.setup_proc(&timers, &idle, 0, 1_000);
        // Monotonic fires in 10ms, wallclock in 2ms (3_000 - 1_000 us); the
        // nearer one wins regardless of which clock it's on.
        assert_eq!(wait, Some(Duration::from_micros(2_000)));
    }
}
