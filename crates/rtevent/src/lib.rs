//! # rtevent
//!
//! Timer, async-signal dispatch, and idle-callback core for an embeddable
//! scripting runtime, modeled on a Tcl-style event loop. This crate is the
//! facade: it bundles one thread's clock, timer queues, idle queue, async
//! registry, and notifier into an [`EventScheduler`], and exposes the
//! `after`/`timer` command surface over it.
//!
//! The scheduler does not evaluate scripts itself - embedding an
//! interpreter is the host's job, expressed here as the [`ScriptHost`]
//! trait. What this crate owns is *when* a script runs, not *what* running
//! it means.
//!
//! ```no_run
//! use rtevent::EventScheduler;
//! use std::time::Duration;
//!
//! let scheduler = EventScheduler::new();
//! let id = scheduler.after_ms(10, "puts fired", || println!("fired")).unwrap();
//! scheduler.sleep_for(Duration::from_millis(20)).unwrap();
//! scheduler.drain_due();
//! ```

#![allow(dead_code)]

pub mod commands;
mod scheduler;

pub use rtevent_core::{
    env_get, env_get_bool, env_get_opt, env_get_str, env_is_set, AfterId, AsyncHandle, EventError,
    EventResult, LimitToken, TimerToken,
};
pub use rtevent_core::{rt_debug, rt_error, rt_info, rt_println, rt_trace, rt_warn};
pub use rtevent_runtime::{AsyncRegistry, RuntimeConfig, TimerKind};

pub use commands::{parse_time_value, parse_unit, ScriptHost, TimeUnit};
pub use scheduler::{AfterEntryKind, EntryDescription, EventScheduler};
