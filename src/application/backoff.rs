//! Pure retry-delay calculation for the scheduled job runner.

use std::time::Duration;

const BASE_DELAY_MS: u64 = 30_000;
const MAX_DELAY_MS: u64 = 3_600_000;

/// Delay to wait before retry number `attempt` (1-based).
///
/// Exponential: 30s doubling per attempt, saturating at one hour. The cap
/// sits beyond the runner's retry budget (attempt 5 yields 8 minutes), so
/// every delay actually scheduled grows strictly with the attempt count.
/// Deterministic: no jitter.
pub fn delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63);
    let ms = BASE_DELAY_MS
        .checked_shl(exponent)
        .unwrap_or(MAX_DELAY_MS)
        .min(MAX_DELAY_MS);
    Duration::from_millis(ms)
}
