//! Exponential backoff arithmetic shared by retry stamping and the
//! circuit-breaker cooldown.

use std::time::Duration;

use beacon_core::Timestamp;

/// Delay for the given zero-based attempt: `base * 2^attempt`, capped.
pub fn delay_for_attempt(base: Duration, attempt: u32, cap: Duration) -> Duration {
    // Beyond 2^20 the cap has long since taken over; clamping the shift
    // keeps the multiplication from overflowing.
    let factor = 2u32.saturating_pow(attempt.min(20));
    base.saturating_mul(factor).min(cap)
}

/// `now + delay`, saturating instead of panicking on overflow.
pub fn eligible_at(now: Timestamp, delay: Duration) -> Timestamp {
    let delta = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
    now.checked_add_signed(delta).unwrap_or(Timestamp::MAX_UTC)
}
