//! # rtevent-runtime
//!
//! Platform-specific runtime for the timer/async/idle core:
//! - Clock source with drift calibration on platforms without a trustworthy
//!   monotonic clock
//! - Process-wide async-handler registry with signal-safe marking
//! - Per-thread timer scheduler (monotonic + wall-clock queues) and idle queue
//! - Notifier setup/check hooks tying the scheduler to an outer event loop
//! - The cooperative blocking delay engine

#![allow(dead_code)]

pub mod async_registry;
pub mod clock;
pub mod config;
pub mod delay;
pub mod notifier;
pub mod timer;
pub mod tls;

pub use async_registry::{AsyncCallback, AsyncRegistry};
pub use clock::Clock;
pub use config::RuntimeConfig;
pub use delay::{sleep_monotonic, sleep_wallclock};
pub use notifier::Notifier;
pub use timer::{IdleQueue, TimerKind, TimerQueues};
