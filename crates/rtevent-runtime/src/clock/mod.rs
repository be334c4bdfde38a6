//! Wall-clock and monotonic clock sources, in microseconds.
//!
//! Two clock sources exist:
//!
//! - [`ClockSource::Native`]: the platform monotonic clock is already
//!   trustworthy (no drift correction needed). This is the default on Linux,
//!   where `std::time::Instant` is backed by `CLOCK_MONOTONIC`.
//! - [`ClockSource::Calibrated`]: only a free-running counter is available;
//!   a background thread (`clock::calibration`) phase-locks it to wall time.
//!
//! The source is picked once at `Clock::new()` time, mirroring the C
//! original's compile-time `#ifdef` ladder rather than branching per read.

pub mod calibration;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub use calibration::{CalibrationSnapshot, CalibrationThread, CounterSource};

/// Which strategy a [`Clock`] uses to produce monotonic time.
#[derive(Clone)]
pub enum ClockSource {
    /// `std::time::Instant`, relative to process start, offset to the wall
    /// clock reading taken at the same instant.
    Native { epoch_wall_us: i64, epoch: std::time::Instant },
    /// Perf-counter-backed, phase-locked to wall time by a calibration
    /// thread. See [`calibration`].
    Calibrated(Arc<CalibrationThread>),
}

/// A hookable source of wall-clock microseconds, so tests can simulate
/// clock jumps without touching the system clock.
pub trait WallClockHook: Send + Sync {
    fn now_us(&self) -> i64;
}

struct SystemWallClock;

impl WallClockHook for SystemWallClock {
    fn now_us(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0)
    }
}

/// Reads wall-clock and monotonic time in microseconds.
pub struct Clock {
    wall: Arc<dyn WallClockHook>,
    source: ClockSource,
}

impl Clock {
    /// Build a clock using the real system wall clock and the native
    /// monotonic source.
    pub fn new() -> Self {
        let wall: Arc<dyn WallClockHook> = Arc::new(SystemWallClock);
        let epoch_wall_us = wall.now_us();
        Self {
            wall,
            source: ClockSource::Native {
                epoch_wall_us,
                epoch: std::time::Instant::now(),
            },
        }
    }

    /// Build a clock with a calibration thread driven by `counter`, for
    /// platforms (or tests) without a trustworthy monotonic clock.
    pub fn with_calibration(wall: Arc<dyn WallClockHook>, counter: Arc<dyn CounterSource>) -> Self {
        let thread = CalibrationThread::spawn(wall.clone(), counter);
        Self {
            wall,
            source: ClockSource::Calibrated(thread),
        }
    }

    /// Build a clock with a substituted wall-clock hook but the native
    /// monotonic source, for tests exercising wall-clock-dependent commands
    /// (`timer at`, `sleep until`) without waiting on real time.
    pub fn with_wall_hook(wall: Arc<dyn WallClockHook>) -> Self {
        let epoch_wall_us = wall.now_us();
        Self {
            wall,
            source: ClockSource::Native {
                epoch_wall_us,
                epoch: std::time::Instant::now(),
            },
        }
    }

    #[inline]
    pub fn wall_now(&self) -> i64 {
        self.wall.now_us()
    }

    #[inline]
    pub fn monotonic_now(&self) -> i64 {
        match &self.source {
            ClockSource::Native { epoch_wall_us, epoch } => {
                epoch_wall_us + epoch.elapsed().as_micros() as i64
            }
            ClockSource::Calibrated(thread) => thread.now_us(),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct FixedWall(AtomicI64);
    impl WallClockHook for FixedWall {
        fn now_us(&self) -> i64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn test_native_monotonic_never_decreases() {
        let clock = Clock::new();
        let a = clock.monotonic_now();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = clock.monotonic_now();
        assert!(b >= a);
    }

    #[test]
    fn test_wall_hook_overrides_reading() {
        let wall = Arc::new(FixedWall(AtomicI64::new(1_000_000)));
        let clock = Clock::with_wall_hook(wall.clone());
        assert_eq!(clock.wall_now(), 1_000_000);
        wall.0.store(2_000_000, Ordering::Relaxed);
        assert_eq!(clock.wall_now(), 2_000_000);
    }
}
