//! Jittered exponential backoff, shared by every component that retries a
//! flaky outbound call (the LLM gateway, the memory provider client) so
//! they back off the same way rather than each inventing their own curve.

use std::time::Duration;

use rand::Rng;

/// Base delay before the first retry; doubles per subsequent attempt.
pub const BASE_BACKOFF_MS: u64 = 200;

/// Returns a delay for retry attempt `attempt` (1-indexed): doubles per
/// attempt from [`BASE_BACKOFF_MS`], plus up to 50% jitter to avoid
/// thundering-herd retries against a recovering dependency.
#[must_use]
pub fn jittered_backoff(attempt: u32) -> Duration {
    let exp_ms = BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.saturating_sub(1));
    let jitter_ms = rand::thread_rng().gen_range(0..=exp_ms / 2 + 1);
    Duration::from_millis(exp_ms + jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_attempt() {
        let first = jittered_backoff(1);
        let third = jittered_backoff(3);
        assert!(first.as_millis() < 1000);
        assert!(third.as_millis() >= u128::from(BASE_BACKOFF_MS) * 4);
    }
}
