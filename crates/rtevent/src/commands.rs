//! Unit parsing and the `ScriptHost` trait backing the `after`/`timer`
//! command surface.
//!
//! The scheduler in [`crate::scheduler`] owns *when* a callback runs; this
//! module is the thin layer that turns command arguments (a number, a unit
//! string, a script) into the scheduler calls, and defines how a script
//! actually gets evaluated via [`ScriptHost`].

use rtevent_core::{EventError, EventResult};

/// A recognized time unit. Parsed from an unambiguous prefix of its full
/// name: `u`/`us`/`microsecond(s)`, `m`/`ms`/`millisecond(s)`,
/// `s`/`second(s)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Microseconds,
    Milliseconds,
    Seconds,
}

impl TimeUnit {
    pub fn to_micros(self, value: f64) -> EventResult<i64> {
        let micros = match self {
            TimeUnit::Microseconds => value,
            TimeUnit::Milliseconds => value * 1_000.0,
            TimeUnit::Seconds => value * 1_000_000.0,
        };
        if !micros.is_finite() || micros.abs() > i64::MAX as f64 {
            return Err(EventError::TimeTooFar);
        }
        Ok(micros as i64)
    }
}

/// The recognized unit names, in the order `tclTimer.c`'s `unitItems` table
/// lists them. `"ms"` and `"milliseconds"` are separate entries (as are
/// `"us"`/`"microseconds"`) so a short prefix like `"m"` is a genuine prefix
/// of three distinct entries rather than two spellings of one.
const UNIT_TABLE: &[(&str, TimeUnit)] = &[
    ("us", TimeUnit::Microseconds),
    ("microseconds", TimeUnit::Microseconds),
    ("milliseconds", TimeUnit::Milliseconds),
    ("ms", TimeUnit::Milliseconds),
    ("s", TimeUnit::Seconds),
    ("seconds", TimeUnit::Seconds),
];

/// Parse a unit string the way `Tcl_GetIndexFromObj` resolves a table entry:
/// an exact match wins outright; otherwise the input must be a prefix of
/// exactly one table entry, or it's rejected as ambiguous (or unrecognized,
/// if it prefixes none).
pub fn parse_unit(s: &str) -> EventResult<TimeUnit> {
    if s.is_empty() {
        return Err(EventError::BadUnit(s.to_string()));
    }
    if let Some((_, unit)) = UNIT_TABLE.iter().find(|(name, _)| *name == s) {
        return Ok(*unit);
    }
    let mut matches = UNIT_TABLE.iter().filter(|(name, _)| name.starts_with(s));
    match (matches.next(), matches.next()) {
        (Some((_, unit)), None) => Ok(*unit),
        _ => Err(EventError::BadUnit(s.to_string())),
    }
}

/// Parse a `<value> <unit>` pair into microseconds, the form every
/// `timer`/`sleep` subcommand argument takes.
pub fn parse_time_value(value: f64, unit: &str) -> EventResult<i64> {
    parse_unit(unit)?.to_micros(value)
}

/// What a host interpreter must provide so the scheduler can run a
/// scheduled script. Kept deliberately small: evaluating a script and
/// reporting a background error are the only two things the timer/idle/
/// async core needs from the surrounding interpreter.
pub trait ScriptHost: Send {
    /// Evaluate `script` at global scope. The return value is opaque to the
    /// scheduler; only whether it errored matters for background-error
    /// reporting.
    fn eval(&mut self, script: &str) -> Result<String, String>;

    /// Report an error raised by a script run from a timer, idle, or async
    /// callback (the script did not run synchronously under a caller that
    /// could see the error itself).
    fn report_background_error(&mut self, script: &str, error: &str) {
        let _ = (script, error);
    }
}

/// Wrap a `ScriptHost`'s `eval` so a scheduled callback reports failures
/// through `report_background_error` instead of propagating them, matching
/// how a fired `after`/`timer` script's errors surface.
pub fn run_as_background(host: &mut dyn ScriptHost, script: &str) {
    if let Err(error) = host.eval(script) {
        host.report_background_error(script, &error);
    }
}
