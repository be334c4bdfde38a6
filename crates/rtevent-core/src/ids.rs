//! Identifier newtypes for timer tokens, async handles, and after-records

use core::fmt;

/// Per-thread timer token, unique among timers scheduled by the same thread.
///
/// Allocated from a per-thread monotonically increasing counter (see
/// `rtevent-runtime::timer`). Tokens are compared numerically to implement
/// the firing-pass fence rule: a timer with a token greater than the fence
/// captured at the start of a service pass is deferred to the next pass.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TimerToken(u64);

impl TimerToken {
    pub const NONE: TimerToken = TimerToken(u64::MAX);

    #[inline]
    pub const fn new(id: u64) -> Self {
        TimerToken(id)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u64::MAX
    }
}

impl fmt::Debug for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimerToken({})", self.0)
    }
}

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for TimerToken {
    fn default() -> Self {
        TimerToken::NONE
    }
}

/// Process-wide async-handler identity.
///
/// Indexes into the global async registry (`rtevent-runtime::async_registry`).
/// Stable for the lifetime of the handler; reused only after `delete`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct AsyncHandle(u32);

impl AsyncHandle {
    #[inline]
    pub const fn new(id: u32) -> Self {
        AsyncHandle(id)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for AsyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AsyncHandle({})", self.0)
    }
}

impl fmt::Display for AsyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a scheduled `after`/`timer` command, formatted as `after#<N>`
/// in the command surface (see `rtevent::commands`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct AfterId(u64);

impl AfterId {
    #[inline]
    pub const fn new(id: u64) -> Self {
        AfterId(id)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Format as the user-visible id string, e.g. `after#42`.
    pub fn to_tag(self) -> String {
        format!("after#{}", self.0)
    }

    /// Parse a user-visible id string. Requires the exact `after#` prefix,
    /// no leading sign, and no trailing non-digit characters.
    pub fn parse_tag(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("after#")?;
        if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        rest.parse::<u64>().ok().map(AfterId)
    }
}

impl fmt::Debug for AfterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AfterId({})", self.0)
    }
}

impl fmt::Display for AfterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_token_none() {
        let none = TimerToken::NONE;
        assert!(none.is_none());
        assert!(!TimerToken::new(3).is_none());
    }

    #[test]
    fn test_timer_token_ordering() {
        assert!(TimerToken::new(1) < TimerToken::new(2));
    }

    #[test]
    fn test_after_id_tag_roundtrip() {
        let id = AfterId::new(42);
        assert_eq!(id.to_tag(), "after#42");
        assert_eq!(AfterId::parse_tag("after#42"), Some(id));
    }

    #[test]
    fn test_after_id_parse_rejects_garbage() {
        assert_eq!(AfterId::parse_tag("after#-1"), None);
        assert_eq!(AfterId::parse_tag("after#1x"), None);
        assert_eq!(AfterId::parse_tag("timer#1"), None);
        assert_eq!(AfterId::parse_tag("after#"), None);
    }

    #[test]
    fn test_async_handle_basics() {
        let h = AsyncHandle::new(7);
        assert_eq!(h.as_u32(), 7);
        assert_eq!(h.as_usize(), 7);
    }
}
