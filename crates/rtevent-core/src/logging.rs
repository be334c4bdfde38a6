//! Kernel-style print macros for rtevent
//!
//! Env-gated debug output in the same spirit as the Linux kernel's printk,
//! tagged with the calling thread's registered name instead of a worker id
//! since there is no worker pool here, only per-thread schedulers.
//!
//! # Environment Variables
//!
//! - `RTEVENT_FLUSH_EPRINT=1` - Flush stderr after each print
//! - `RTEVENT_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//! - `RTEVENT_LOG_TIME=1` - Include nanosecond timestamp in output
//!
//! # Output Format
//!
//! Without timestamp: `[LEVEL] [thread] message`
//! With timestamp:    `[LEVEL] [<ns>] [thread] message`
//!
//! # Usage
//!
//! ```ignore
//! use rtevent_core::{rt_debug, rt_info, rt_warn, rt_error};
//!
//! rt_debug!("scheduling timer token={}", token);
//! rt_info!("service pass fired {} timers", n);
//! rt_warn!("calibration drift {}us exceeds threshold", drift);
//! rt_error!("async handle deleted from non-owning thread");
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;
use crate::env::env_get_bool;

/// Log levels (matches common conventions)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static TIME_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize logging from environment variables.
///
/// Called automatically on first log, but can be called explicitly for
/// deterministic initialization (e.g. before spawning the calibration thread).
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    START_TIME.get_or_init(Instant::now);

    FLUSH_ENABLED.store(env_get_bool("RTEVENT_FLUSH_EPRINT", false), Ordering::Relaxed);
    TIME_ENABLED.store(env_get_bool("RTEVENT_LOG_TIME", false), Ordering::Relaxed);

    if let Ok(val) = std::env::var("RTEVENT_LOG_LEVEL") {
        let level = match val.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => LogLevel::Info,
        };
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

#[inline]
pub fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn time_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    TIME_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

#[inline]
pub fn elapsed_ns() -> u64 {
    let start = START_TIME.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}

thread_local! {
    static THREAD_NAME: std::cell::RefCell<Option<String>> = const { std::cell::RefCell::new(None) };
}

/// Tag the calling thread for log context (called by the registry on thread registration).
pub fn set_thread_name(name: impl Into<String>) {
    THREAD_NAME.with(|n| *n.borrow_mut() = Some(name.into()));
}

fn format_context() -> String {
    THREAD_NAME.with(|n| match &*n.borrow() {
        Some(name) => format!("[{}]", name),
        None => "[?]".to_string(),
    })
}

#[doc(hidden)]
pub fn _kprint_impl(args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_fmt(args);
    if flush_enabled() {
        let _ = handle.flush();
    }
}

#[doc(hidden)]
pub fn _kprintln_impl(args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }

    let stderr = std::io::stderr();
    let mut handle = stderr.lock();

    let _ = write!(handle, "{} ", level.prefix());

    if time_enabled() {
        let _ = write!(handle, "[{}] ", elapsed_ns());
    }

    let _ = write!(handle, "{} ", format_context());
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");

    if flush_enabled() {
        let _ = handle.flush();
    }
}

/// Print to stderr (no newline, no context)
#[macro_export]
macro_rules! rt_print {
    ($($arg:tt)*) => {{
        $crate::logging::_kprint_impl(format_args!($($arg)*));
    }};
}

/// Print to stderr with newline (no context)
#[macro_export]
macro_rules! rt_println {
    () => {{
        $crate::logging::_kprintln_impl(format_args!(""));
    }};
    ($($arg:tt)*) => {{
        $crate::logging::_kprintln_impl(format_args!($($arg)*));
    }};
}

/// Error level log with thread context
#[macro_export]
macro_rules! rt_error {
    ($($arg:tt)*) => {{
        $crate::logging::_klog_impl(
            $crate::logging::LogLevel::Error,
            format_args!($($arg)*)
        );
    }};
}

/// Warning level log with thread context
#[macro_export]
macro_rules! rt_warn {
    ($($arg:tt)*) => {{
        $crate::logging::_klog_impl(
            $crate::logging::LogLevel::Warn,
            format_args!($($arg)*)
        );
    }};
}

/// Info level log with thread context
#[macro_export]
macro_rules! rt_info {
    ($($arg:tt)*) => {{
        $crate::logging::_klog_impl(
            $crate::logging::LogLevel::Info,
            format_args!($($arg)*)
        );
    }};
}

/// Debug level log with thread context
#[macro_export]
macro_rules! rt_debug {
    ($($arg:tt)*) => {{
        $crate::logging::_klog_impl(
            $crate::logging::LogLevel::Debug,
            format_args!($($arg)*)
        );
    }};
}

/// Trace level log with thread context
#[macro_export]
macro_rules! rt_trace {
    ($($arg:tt)*) => {{
        $crate::logging::_klog_impl(
            $crate::logging::LogLevel::Trace,
            format_args!($($arg)*)
        );
    }};
}
