//! Calibration thread: phase-locks a free-running counter to wall time.
//!
//! Platforms where the monotonic clock cannot be trusted outright (a bare
//! cycle counter, a VM-exposed timer that can stall across a migration) need
//! periodic correction. A dedicated thread samples the counter alongside the
//! wall clock, computes a frequency and offset estimate, and publishes a
//! snapshot the readers use to convert counter ticks to microseconds.
//!
//! The correction never lets `now_us()` run backwards: a new estimate is
//! blended in only if it would not move the published clock behind its
//! previous reading.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::WallClockHook;

/// A free-running counter to be phase-locked against wall time. On real
/// platforms this wraps a perf counter or `clock_gettime(CLOCK_MONOTONIC_RAW)`;
/// tests provide a fake that can be driven independently of real time.
pub trait CounterSource: Send + Sync {
    /// Current counter reading, in ticks.
    fn read(&self) -> u64;
    /// Ticks per second, if known in advance (0 if purely empirical).
    fn nominal_hz(&self) -> u64;
}

/// A published offset/frequency estimate, read by every `monotonic_now()`
/// call without taking a lock.
#[derive(Clone, Copy, Debug)]
pub struct CalibrationSnapshot {
    pub counter_at_sample: u64,
    pub us_at_sample: i64,
    /// Microseconds per counter tick, scaled by 2^32 for fixed-point math.
    pub us_per_tick_q32: u64,
}

/// Reject a frequency correction that would move the estimate by more than
/// this fraction in one step. Matches typical hardware clock drift budgets.
const MAX_FREQ_DEVIATION: f64 = 0.003;

/// A wall-clock jump larger than this is treated as a clock-set discontinuity
/// (NTP step, VM resume) rather than ordinary drift, and is applied outright
/// instead of being smoothed in.
const DISCONTINUITY_THRESHOLD_US: i64 = 1_000_000;

pub struct CalibrationThread {
    snapshot: AtomicSnapshot,
    counter: Arc<dyn CounterSource>,
    shutdown: Arc<AtomicBool>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Lock-free storage for a `CalibrationSnapshot`, packed into two atomics so
/// readers never block behind the calibration thread.
struct AtomicSnapshot {
    counter_and_freq: AtomicI64,
    us_at_sample: AtomicI64,
    counter_at_sample: AtomicI64,
}

impl AtomicSnapshot {
    fn new(initial: CalibrationSnapshot) -> Self {
        let s = Self {
            counter_and_freq: AtomicI64::new(initial.us_per_tick_q32 as i64),
            us_at_sample: AtomicI64::new(initial.us_at_sample),
            counter_at_sample: AtomicI64::new(initial.counter_at_sample as i64),
        };
        s
    }

    fn store(&self, snap: CalibrationSnapshot) {
        self.counter_at_sample.store(snap.counter_at_sample as i64, Ordering::Relaxed);
        self.counter_and_freq.store(snap.us_per_tick_q32 as i64, Ordering::Relaxed);
        self.us_at_sample.store(snap.us_at_sample, Ordering::Release);
    }

    fn load(&self) -> CalibrationSnapshot {
        let us_at_sample = self.us_at_sample.load(Ordering::Acquire);
        let counter_at_sample = self.counter_at_sample.load(Ordering::Relaxed) as u64;
        let us_per_tick_q32 = self.counter_and_freq.load(Ordering::Relaxed) as u64;
        CalibrationSnapshot { counter_at_sample, us_at_sample, us_per_tick_q32 }
    }
}

impl CalibrationThread {
    /// Take an initial sample and spawn the background loop.
    pub fn spawn(wall: Arc<dyn WallClockHook>, counter: Arc<dyn CounterSource>) -> Arc<Self> {
        let counter_at_sample = counter.read();
        let us_at_sample = wall.now_us();
        let hz = counter.nominal_hz().max(1);
        let us_per_tick_q32 = ((1_000_000u128 << 32) / hz as u128) as u64;

        let this = Arc::new(Self {
            snapshot: AtomicSnapshot::new(CalibrationSnapshot {
                counter_at_sample,
                us_at_sample,
                us_per_tick_q32,
            }),
            counter: counter.clone(),
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: std::sync::Mutex::new(None),
        });

        let worker = this.clone();
        let shutdown = this.shutdown.clone();
        let join = thread::Builder::new()
            .name("rtevent-clock-cal".into())
            .spawn(move || calibration_loop(worker, wall, counter, shutdown))
            .expect("failed to spawn calibration thread");
        *this.handle.lock().unwrap() = Some(join);
        this
    }

    /// Convert the current counter reading to microseconds using the latest
    /// published snapshot, extrapolating through `us_per_tick_q32` for ticks
    /// elapsed since that snapshot was taken. Lock-free; safe to call from
    /// any thread.
    pub fn now_us(&self) -> i64 {
        let snap = self.snapshot.load();
        let counter_now = self.counter.read();
        let elapsed_ticks = counter_now.saturating_sub(snap.counter_at_sample);
        let elapsed_us = ((elapsed_ticks as u128 * snap.us_per_tick_q32 as u128) >> 32) as i64;
        snap.us_at_sample.saturating_add(elapsed_us)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

impl Drop for CalibrationThread {
    fn drop(&mut self) {
        self.request_shutdown();
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn calibration_loop(
    thread: Arc<CalibrationThread>,
    wall: Arc<dyn WallClockHook>,
    counter: Arc<dyn CounterSource>,
    shutdown: Arc<AtomicBool>,
) {
    let mut interval = Duration::from_secs(1);
    let min_interval = Duration::from_secs(1);
    let max_interval = Duration::from_secs(10);

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(interval);
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let prev = thread.snapshot.load();
        let counter_now = counter.read();
        let us_now = wall.now_us();

        let elapsed_us = us_now - prev.us_at_sample;
        let elapsed_ticks = counter_now.saturating_sub(prev.counter_at_sample);

        if elapsed_us <= 0 || elapsed_ticks == 0 {
            interval = (interval * 2).min(max_interval);
            continue;
        }

        if elapsed_us.abs() >= DISCONTINUITY_THRESHOLD_US {
            thread.snapshot.store(CalibrationSnapshot {
                counter_at_sample: counter_now,
                us_at_sample: us_now,
                us_per_tick_q32: prev.us_per_tick_q32,
            });
            interval = min_interval;
            continue;
        }

        let measured_us_per_tick_q32 =
            ((elapsed_us as u128) << 32) / elapsed_ticks as u128;
        let prev_q32 = prev.us_per_tick_q32 as u128;
        let deviation = if prev_q32 == 0 {
            0.0
        } else {
            (measured_us_per_tick_q32 as f64 - prev_q32 as f64) / prev_q32 as f64
        };

        let accepted_q32 = if deviation.abs() > MAX_FREQ_DEVIATION {
            // Clamp rather than adopt an outlier measurement outright.
            let clamp = if deviation > 0.0 { 1.0 + MAX_FREQ_DEVIATION } else { 1.0 - MAX_FREQ_DEVIATION };
            (prev_q32 as f64 * clamp) as u64
        } else {
            measured_us_per_tick_q32 as u64
        };

        // Never let the published wall-time estimate run backwards.
        let candidate_us = us_now.max(prev.us_at_sample);

        thread.snapshot.store(CalibrationSnapshot {
            counter_at_sample: counter_now,
            us_at_sample: candidate_us,
            us_per_tick_q32: accepted_q32,
        });

        interval = if deviation.abs() > MAX_FREQ_DEVIATION / 2.0 {
            min_interval
        } else {
            (interval * 2).min(max_interval)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct FakeWall(AtomicI64);
    impl WallClockHook for FakeWall {
        fn now_us(&self) -> i64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    struct FakeCounter(AtomicU64);
    impl CounterSource for FakeCounter {
        fn read(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
        fn nominal_hz(&self) -> u64 {
            1_000_000
        }
    }

    #[test]
    fn test_initial_snapshot_matches_wall_clock() {
        let wall = Arc::new(FakeWall(AtomicI64::new(5_000_000)));
        let counter = Arc::new(FakeCounter(AtomicU64::new(0)));
        let thread = CalibrationThread::spawn(wall, counter);
        assert_eq!(thread.now_us(), 5_000_000);
        thread.request_shutdown();
    }

    #[test]
    fn test_now_us_extrapolates_between_snapshots() {
        // nominal_hz is 1_000_000 (one tick per microsecond), so advancing
        // the counter without waiting for the background loop's next tick
        // must still move `now_us` forward by the same amount.
        let wall = Arc::new(FakeWall(AtomicI64::new(5_000_000)));
        let counter = Arc::new(FakeCounter(AtomicU64::new(0)));
        let thread = CalibrationThread::spawn(wall, counter.clone());
        counter.0.store(2_500, Ordering::Relaxed);
        assert_eq!(thread.now_us(), 5_002_500);
        thread.request_shutdown();
    }
}
