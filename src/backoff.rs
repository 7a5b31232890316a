//! Retry backoff schedule.
//!
//! `backoff(i)` gives the delay to wait before attempt `i` (zero-based),
//! including before the very first attempt. All retry sites in this crate
//! (§6) use the same 10-attempt, exponential-with-cap schedule, grounded in
//! the doubling sleep used by the teacher's `stream::mod` retry loop.

use std::time::Duration;

/// Maximum number of attempts at any retry site.
pub const MAX_ATTEMPTS: u32 = 10;

/// A host time source for backoff delays, abstracted so tests can swap in
/// a zero-delay schedule without waiting on real timers.
pub trait Backoff: Send + Sync {
    /// The delay to wait before attempt `i` (zero-based attempt index).
    fn delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff starting at 250ms and capping at 10s:
/// `min(2^i * 250ms, 10s)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialBackoff;

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let base_ms: u64 = 250;
        let capped_exp = attempt.min(16);
        let ms = base_ms.saturating_mul(1u64 << capped_exp);
        Duration::from_millis(ms.min(10_000))
    }
}

/// A backoff with no delay, used in tests so retry-bound assertions run
/// instantly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl Backoff for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_caps() {
        let b = ExponentialBackoff;
        assert_eq!(b.delay(0), Duration::from_millis(250));
        assert_eq!(b.delay(1), Duration::from_millis(500));
        assert_eq!(b.delay(5), Duration::from_millis(8_000));
        assert_eq!(b.delay(20), Duration::from_millis(10_000));
    }

    #[test]
    fn no_backoff_is_zero() {
        let b = NoBackoff;
        for i in 0..MAX_ATTEMPTS {
            assert_eq!(b.delay(i), Duration::ZERO);
        }
    }
}
