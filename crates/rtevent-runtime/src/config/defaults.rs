//! Compile-time default values for `RuntimeConfig`.

pub const MAX_SLEEP_SLICE_MS: u64 = 500;
pub const CALIBRATION_MIN_INTERVAL_MS: u64 = 1_000;
pub const CALIBRATION_MAX_INTERVAL_MS: u64 = 10_000;
pub const RECHECK_SKIP_THRESHOLD_MS: u64 = 20;
