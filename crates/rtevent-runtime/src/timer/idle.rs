//! Idle callback FIFO.
//!
//! Idle callbacks run only when a thread's event loop has nothing more
//! pressing to do. They fire in the order they were queued, and a callback
//! that queues another idle callback does not let the new one run in the
//! same sweep: `run_pending` snapshots a generation fence up front, the same
//! way `TimerQueues::service` fences on a token, so a self-requeuing idle
//! handler can't starve the rest of the loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rtevent_core::ids::TimerToken;

type IdleCallback = Box<dyn FnMut() + Send>;

struct IdleEntry {
    token: TimerToken,
    generation: u64,
    callback: Mutex<Option<IdleCallback>>,
}

/// A thread-local FIFO of idle callbacks.
pub struct IdleQueue {
    entries: Mutex<VecDeque<IdleEntry>>,
    next_generation: AtomicU64,
}

impl IdleQueue {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Queue a callback to run the next time `run_pending` is called.
    /// Returns a token for `cancel`.
    pub fn queue(&self, callback: impl FnMut() + Send + 'static) -> TimerToken {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = TimerToken::new(generation);
        self.entries.lock().unwrap().push_back(IdleEntry {
            token,
            generation,
            callback: Mutex::new(Some(Box::new(callback))),
        });
        token
    }

    pub fn cancel(&self, token: TimerToken) -> bool {
        let mut entries = self.entries.lock().unwrap();
        if let Some(pos) = entries.iter().position(|e| e.token == token) {
            entries.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Whether `token` is still pending (not yet run or cancelled).
    pub fn contains(&self, token: TimerToken) -> bool {
        self.entries.lock().unwrap().iter().any(|e| e.token == token)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Run every callback queued before this call. Callbacks queued during
    /// the sweep (including by another callback in the same sweep) wait for
    /// the next call. Returns the number run.
    pub fn run_pending(&self) -> usize {
        let fence = self.next_generation.load(Ordering::Relaxed);
        let mut ran = 0usize;

        loop {
            let due = {
                let entries = self.entries.lock().unwrap();
                entries.iter().position(|e| e.generation < fence)
            };
            let Some(pos) = due else { break };

            let callback = {
                let mut entries = self.entries.lock().unwrap();
                let entry = entries.remove(pos).unwrap();
                entry.callback.into_inner().unwrap()
            };
            if let Some(mut cb) = callback {
                cb();
                ran += 1;
            }
        }

        ran
    }
}

impl Default for IdleQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fifo_order() {
        let q = IdleQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            q.queue(move || order.lock().unwrap().push(i));
        }
        q.run_pending();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_requeue_during_sweep_waits_for_next_call() {
        let q = Arc::new(IdleQueue::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let q2 = q.clone();
        let order2 = order.clone();
        q.queue(move || {
            order2.lock().unwrap().push("first");
            let order3 = order2.clone();
            q2.queue(move || order3.lock().unwrap().push("requeued"));
        });
        let ran_first = q.run_pending();
        assert_eq!(ran_first, 1);
        assert_eq!(*order.lock().unwrap(), vec!["first"]);
        let ran_second = q.run_pending();
        assert_eq!(ran_second, 1);
        assert_eq!(*order.lock().unwrap(), vec!["first", "requeued"]);
    }

    #[test]
    fn test_cancel_removes_before_it_runs() {
        let q = IdleQueue::new();
        let ran = Arc::new(Mutex::new(false));
        let ran2 = ran.clone();
        let token = q.queue(move || *ran2.lock().unwrap() = true);
        assert!(q.cancel(token));
        q.run_pending();
        assert!(!*ran.lock().unwrap());
    }
}
