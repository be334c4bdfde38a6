//! Per-thread state registry.
//!
//! Every OS thread that owns a scheduler keeps its timer queues, idle queue,
//! and async-invocation flags in a `ThreadState`, reached without locking via
//! a thread-local `Arc`. A second, process-wide map keyed by `ThreadId` lets
//! another thread (or a signal handler, via `async_registry`) find a
//! specific thread's state to mark it ready or tear it down.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::ThreadId;

/// Flags and queues owned by one scheduler thread.
pub struct ThreadState {
    pub thread_id: ThreadId,

    /// At least one async handler is marked and waiting to be invoked on
    /// this thread.
    pub any_ready: AtomicBool,

    /// Set while `async_registry::invoke` is running on this thread, so a
    /// handler marked again during its own callback is picked up by the
    /// same invocation pass rather than deferred (see the re-mark-during-
    /// invoke decision in the design notes).
    pub invocation_in_progress: AtomicBool,
}

impl ThreadState {
    fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            any_ready: AtomicBool::new(false),
            invocation_in_progress: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn mark_ready(&self) {
        self.any_ready.store(true, Ordering::Release);
    }

    #[inline]
    pub fn take_ready(&self) -> bool {
        self.any_ready.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.any_ready.load(Ordering::Acquire)
    }
}

static REGISTRY: OnceLock<Mutex<HashMap<ThreadId, Arc<ThreadState>>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<ThreadId, Arc<ThreadState>>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

thread_local! {
    static LOCAL: RefCell<Option<Arc<ThreadState>>> = const { RefCell::new(None) };
}

/// Deregisters this thread's state from the global map when the owning
/// thread exits, so `for_thread` stops returning stale entries.
struct DeregisterOnExit(ThreadId);

impl Drop for DeregisterOnExit {
    fn drop(&mut self) {
        registry().lock().unwrap().remove(&self.0);
    }
}

thread_local! {
    static EXIT_GUARD: RefCell<Option<DeregisterOnExit>> = const { RefCell::new(None) };
}

/// The calling thread's state, registering it on first use.
pub fn current() -> Arc<ThreadState> {
    LOCAL.with(|cell| {
        if let Some(state) = cell.borrow().as_ref() {
            return state.clone();
        }
        let thread_id = std::thread::current().id();
        let state = Arc::new(ThreadState::new(thread_id));
        registry().lock().unwrap().insert(thread_id, state.clone());
        *cell.borrow_mut() = Some(state.clone());
        EXIT_GUARD.with(|g| *g.borrow_mut() = Some(DeregisterOnExit(thread_id)));
        state
    })
}

/// Look up another thread's state by id, e.g. to mark it ready from a
/// signal handler or a different scheduler thread. Returns `None` if that
/// thread never registered (no scheduler running there) or has exited.
pub fn for_thread(id: ThreadId) -> Option<Arc<ThreadState>> {
    registry().lock().unwrap().get(&id).cloned()
}
