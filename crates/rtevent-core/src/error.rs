//! Error taxonomy for the timer/async/idle core
//!
//! Mirrors the error codes a host interpreter would attach via its own
//! error-code mechanism: each variant knows the exact space-separated tag
//! string the command surface reports (`"TIME OVERFLOW"`, `"LOOKUP EVENT 7"`,
//! ...). `WrongThread` exists for completeness and tests, but the registry
//! never returns it — deleting a handler from a non-owning thread panics.

use core::fmt;

/// Result type for timer/async/idle/command operations.
pub type EventResult<T> = Result<T, EventError>;

/// Errors that can occur in the timer/async/idle core and its command surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// An `after`/`timer` unit argument was not `us`, `ms`, or `s` (or an
    /// unambiguous prefix thereof).
    BadUnit(String),

    /// An index/option argument did not match any recognized value.
    BadIndex(String),

    /// Deadline arithmetic would overflow the microsecond time range.
    TimeTooFar,

    /// `info`/`cancel` referenced an id that does not exist (or already fired).
    NoSuchEvent(String),

    /// A handler was deleted from a thread that does not own it. Modeled for
    /// testability; the real registry panics instead of returning this.
    WrongThread,

    /// The host interpreter was cooperatively cancelled while sleeping.
    Cancelled,

    /// The host interpreter's wall-clock resource limit fired while sleeping.
    LimitExceeded,
}

impl EventError {
    /// The space-separated error-code tag a host interpreter would attach.
    pub fn error_code_tag(&self) -> String {
        match self {
            EventError::BadUnit(got) => format!("LOOKUP INDEX unit {}", got),
            EventError::BadIndex(got) => format!("LOOKUP INDEX option {}", got),
            EventError::TimeTooFar => "TIME OVERFLOW".to_string(),
            EventError::NoSuchEvent(id) => format!("LOOKUP EVENT {}", id),
            EventError::WrongThread => "WRONG THREAD".to_string(),
            EventError::Cancelled => "CANCELLED".to_string(),
            EventError::LimitExceeded => "LIMIT EXCEEDED".to_string(),
        }
    }
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::BadUnit(got) => write!(f, "bad unit \"{}\": must be us, ms, or s", got),
            EventError::BadIndex(got) => write!(f, "bad option \"{}\"", got),
            EventError::TimeTooFar => write!(f, "time too far away"),
            EventError::NoSuchEvent(id) => write!(f, "event \"{}\" doesn't exist", id),
            EventError::WrongThread => write!(f, "event not owned by this thread"),
            EventError::Cancelled => write!(f, "sleep interrupted by cancellation"),
            EventError::LimitExceeded => write!(f, "sleep interrupted by resource limit"),
        }
    }
}

impl std::error::Error for EventError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_too_far_tag() {
        assert_eq!(EventError::TimeTooFar.error_code_tag(), "TIME OVERFLOW");
    }

    #[test]
    fn test_no_such_event_tag() {
        let e = EventError::NoSuchEvent("after#7".to_string());
        assert_eq!(e.error_code_tag(), "LOOKUP EVENT after#7");
    }

    #[test]
    fn test_bad_unit_tag() {
        let e = EventError::BadUnit("fortnights".to_string());
        assert!(e.error_code_tag().starts_with("LOOKUP INDEX"));
    }

    #[test]
    fn test_display_messages_nonempty() {
        for e in [
            EventError::TimeTooFar,
            EventError::Cancelled,
            EventError::LimitExceeded,
            EventError::WrongThread,
        ] {
            assert!(!format!("{}", e).is_empty());
        }
    }
}
