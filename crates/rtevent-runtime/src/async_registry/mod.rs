//! Process-wide async-handler registry.
//!
//! An async handler is created once on a thread, and from then on can be
//! marked ready from anywhere: the same thread, another thread, or a signal
//! handler. `mark_from_signal` touches only a fixed-size array of atomics
//! and a raw `write(2)` to a self-pipe fd, so it is safe to call from
//! inside a signal handler (no allocation, no mutex). `invoke` runs on the
//! owning thread only and rescans from the head of the list after every
//! callback, since a callback may create or delete handlers.
//!
//! When a thread that owns handlers exits, `finalize_thread` unlinks and
//! frees them (armed automatically the first time that thread calls
//! `create`), so a signal delivered after the thread is gone cannot mark a
//! slot whose owner no longer exists.

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Mutex, OnceLock};
use std::thread::ThreadId;

use rtevent_core::ids::AsyncHandle;

use crate::tls;

/// Upper bound on concurrently live async handlers. Chosen generously; spec
/// scope has no notion of releasing this back, so a fixed array keeps
/// `mark_from_signal` lock-free without a more involved slab allocator.
const MAX_HANDLERS: usize = 4096;

pub type AsyncCallback = Box<dyn FnMut() + Send + 'static>;

struct HandlerMeta {
    owner_thread: ThreadId,
    callback: Mutex<AsyncCallback>,
    live: bool,
}

struct Slots {
    ready: Vec<AtomicBool>,
    meta: Mutex<Vec<Option<HandlerMeta>>>,
    free: Mutex<Vec<u32>>,
}

static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

/// Registers the fd a self-pipe notifier listens on, so signal-safe marking
/// can wake a thread blocked in `poll`/`select`. Overwrites any previous fd.
pub fn set_wake_fd(fd: RawFd) {
    WAKE_FD.store(fd, Ordering::Release);
}

fn wake() {
    let fd = WAKE_FD.load(Ordering::Acquire);
    if fd >= 0 {
        let byte: u8 = 1;
        unsafe {
            libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
        }
    }
}

fn slots() -> &'static Slots {
    static SLOTS: OnceLock<Slots> = OnceLock::new();
    SLOTS.get_or_init(|| Slots {
        ready: (0..MAX_HANDLERS).map(|_| AtomicBool::new(false)).collect(),
        meta: Mutex::new((0..MAX_HANDLERS).map(|_| None).collect()),
        free: Mutex::new((0..MAX_HANDLERS as u32).rev().collect()),
    })
}

/// Register a new handler owned by the calling thread. The callback runs on
/// this thread only, inside `invoke`.
pub fn create(callback: impl FnMut() + Send + 'static) -> AsyncHandle {
    arm_finalize_on_exit();
    let s = slots();
    let idx = s.free.lock().unwrap().pop().expect("async handler slots exhausted");
    let owner_thread = std::thread::current().id();
    s.meta.lock().unwrap()[idx as usize] = Some(HandlerMeta {
        owner_thread,
        callback: Mutex::new(Box::new(callback)),
        live: true,
    });
    s.ready[idx as usize].store(false, Ordering::Relaxed);
    AsyncHandle::new(idx)
}

/// Mark a handler ready from ordinary (non-signal) code, on any thread.
pub fn mark(handle: AsyncHandle) {
    let s = slots();
    s.ready[handle.as_usize()].store(true, Ordering::Release);
    if let Some(meta) = s.meta.lock().unwrap()[handle.as_usize()].as_ref() {
        if let Some(state) = tls::for_thread(meta.owner_thread) {
            state.mark_ready();
        }
    }
    wake();
}

/// Mark a handler ready from inside a signal handler. Touches only the
/// fixed ready-flag array and a raw `write(2)`; takes no lock and performs
/// no allocation.
pub fn mark_from_signal(handle: AsyncHandle) {
    slots().ready[handle.as_usize()].store(true, Ordering::Release);
    wake();
}

/// Mark a handler ready from the notifier's event-checking callback (runs
/// on the owning thread, outside a signal context, so the ordinary path is
/// safe here too).
pub fn mark_from_notifier(handle: AsyncHandle) {
    mark(handle);
}

/// Run every ready handler owned by the current thread. Rescans from the
/// head after each callback: a callback may register or delete handlers,
/// invalidating any cached index range.
pub fn invoke() {
    let state = tls::current();
    state.invocation_in_progress.store(true, Ordering::Release);
    state.take_ready();

    let this_thread = std::thread::current().id();
    let s = slots();

    loop {
        let mut ran_one = false;
        for idx in 0..MAX_HANDLERS {
            let owns = {
                let meta = s.meta.lock().unwrap();
                matches!(&meta[idx], Some(m) if m.live && m.owner_thread == this_thread)
            };
            if !owns {
                continue;
            }
            if s.ready[idx].swap(false, Ordering::AcqRel) {
                let cb_mutex = {
                    let meta = s.meta.lock().unwrap();
                    match &meta[idx] {
                        Some(m) => Some(&m.callback as *const Mutex<AsyncCallback>),
                        None => None,
                    }
                };
                // SAFETY: the slot cannot be freed while `live` stays true,
                // and only the owning thread ever calls `delete` on it while
                // this loop runs (invoke() and delete() both require the
                // owning thread), so the pointer stays valid for the guard
                // below.
                if let Some(ptr) = cb_mutex {
                    let mut cb = unsafe { (*ptr).lock().unwrap() };
                    (cb)();
                    ran_one = true;
                    break;
                }
            }
        }
        if !ran_one {
            break;
        }
    }

    state.invocation_in_progress.store(false, Ordering::Release);
}

/// Remove a handler. Must be called from the thread that created it; any
/// other caller indicates a bug in the embedding code, not a recoverable
/// runtime condition, so this panics rather than returning an error.
pub fn delete(handle: AsyncHandle) {
    let s = slots();
    let idx = handle.as_usize();
    let this_thread = std::thread::current().id();
    let mut meta = s.meta.lock().unwrap();
    match &meta[idx] {
        Some(m) if m.owner_thread == this_thread => {}
        Some(_) => panic!("async handler deleted from a thread other than its owner"),
        None => panic!("async handler already deleted"),
    }
    meta[idx] = None;
    s.ready[idx].store(false, Ordering::Relaxed);
    drop(meta);
    s.free.lock().unwrap().push(idx as u32);
}

/// Unlink and free every handler owned by the calling thread. Called from
/// that thread's exit-time teardown so a signal delivered after the thread
/// has gone away cannot touch freed per-thread state through a dangling
/// owner id.
pub fn finalize_thread() {
    let s = slots();
    let this_thread = std::thread::current().id();
    let mut meta = s.meta.lock().unwrap();
    let mut freed = Vec::new();
    for (idx, slot) in meta.iter_mut().enumerate() {
        if matches!(slot, Some(m) if m.owner_thread == this_thread) {
            *slot = None;
            s.ready[idx].store(false, Ordering::Relaxed);
            freed.push(idx as u32);
        }
    }
    drop(meta);
    if !freed.is_empty() {
        s.free.lock().unwrap().extend(freed);
    }
}

thread_local! {
    /// Its only purpose is to run `finalize_thread` when this thread exits;
    /// the `bool` payload is never read.
    static FINALIZE_ON_EXIT: FinalizeGuard = const { FinalizeGuard };
}

struct FinalizeGuard;

impl Drop for FinalizeGuard {
    fn drop(&mut self) {
        finalize_thread();
    }
}

/// Arm this thread's exit-time cleanup. Idempotent; called from `create` so
/// a thread that never explicitly opts in still gets its handlers reclaimed.
fn arm_finalize_on_exit() {
    FINALIZE_ON_EXIT.with(|_| {});
}

/// Registry facade grouping the free functions above behind a type, for
/// callers that prefer an object over bare module functions (the facade
/// crate's command surface uses this).
pub struct AsyncRegistry;

impl AsyncRegistry {
    pub fn create(callback: impl FnMut() + Send + 'static) -> AsyncHandle {
        create(callback)
    }
    pub fn mark(handle: AsyncHandle) {
        mark(handle)
    }
    pub fn mark_from_signal(handle: AsyncHandle) {
        mark_from_signal(handle)
    }
    pub fn invoke() {
        invoke()
    }
    pub fn delete(handle: AsyncHandle) {
        delete(handle)
    }
    pub fn finalize_thread() {
        finalize_thread()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_create_mark_invoke_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let handle = create(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        mark(handle);
        invoke();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        invoke();
        assert_eq!(count.load(Ordering::SeqCst), 1, "invoke without a mark must be a no-op");
        delete(handle);
    }

    #[test]
    fn test_remark_during_callback_is_picked_up_same_invoke() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let handle_cell: Arc<std::sync::Mutex<Option<AsyncHandle>>> = Arc::new(std::sync::Mutex::new(None));
        let handle_cell2 = handle_cell.clone();
        let handle = create(move || {
            let n = calls2.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                if let Some(h) = *handle_cell2.lock().unwrap() {
                    mark(h);
                }
            }
        });
        *handle_cell.lock().unwrap() = Some(handle);
        mark(handle);
        invoke();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        delete(handle);
    }

    #[test]
    #[should_panic(expected = "other than its owner")]
    fn test_delete_from_other_thread_panics() {
        let handle = create(|| {});
        let h = handle;
        let joined = std::thread::spawn(move || {
            delete(h);
        })
        .join();
        assert!(joined.is_err());
    }

    #[test]
    fn test_handlers_freed_when_owning_thread_exits() {
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = std::thread::spawn(move || {
            let h = create(|| {});
            tx.send(h).unwrap();
        });
        let h = rx.recv().unwrap();
        handle.join().unwrap();

        // The owning thread exited, which runs finalize_thread and frees the
        // slot; marking it from this thread must not find a live owner and
        // so must be a harmless no-op rather than a panic or crash.
        mark(h);
    }
}
