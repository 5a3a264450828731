// Backoff policy - pure delay computation

use crate::domain::BackoffKind;

/// Compute the retry delay for a given attempt number (1-based).
///
/// Exponential: `base * 2^(attempt-1)`, saturating. Fixed: `base`.
/// The optional `max_delay_ms` clamps the result. Deterministic: same
/// inputs always give the same delay (jitter is a separate, opt-in step).
pub fn delay_ms(
    kind: BackoffKind,
    base_delay_ms: i64,
    max_delay_ms: Option<i64>,
    attempt: i32,
) -> i64 {
    debug_assert!(attempt >= 1, "attempt numbers are 1-based");

    let raw = match kind {
        BackoffKind::Fixed => base_delay_ms,
        BackoffKind::Exponential => {
            let exp = (attempt - 1).clamp(0, 62) as u32;
            base_delay_ms.saturating_mul(1i64 << exp)
        }
    };

    match max_delay_ms {
        Some(cap) => raw.min(cap),
        None => raw,
    }
}

/// Apply a deterministic ±10% jitter derived from the job id.
///
/// Stable per job, so a batch of jobs failing together spreads out while
/// each individual job stays reproducible.
pub fn with_jitter(delay_ms: i64, seed: &str) -> i64 {
    let seed_sum = seed.chars().map(|c| c as u32).sum::<u32>();
    let jitter_factor = 0.9 + ((seed_sum % 21) as f64 / 100.0); // 0.9 to 1.1
    (delay_ms as f64 * jitter_factor) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_doubles_per_attempt() {
        assert_eq!(delay_ms(BackoffKind::Exponential, 60_000, None, 1), 60_000);
        assert_eq!(delay_ms(BackoffKind::Exponential, 60_000, None, 2), 120_000);
        assert_eq!(delay_ms(BackoffKind::Exponential, 60_000, None, 3), 240_000);
        assert_eq!(delay_ms(BackoffKind::Exponential, 60_000, None, 8), 7_680_000);
    }

    #[test]
    fn test_fixed_is_constant() {
        for attempt in 1..=8 {
            assert_eq!(delay_ms(BackoffKind::Fixed, 5_000, None, attempt), 5_000);
        }
    }

    #[test]
    fn test_max_delay_clamp() {
        assert_eq!(
            delay_ms(BackoffKind::Exponential, 60_000, Some(100_000), 4),
            100_000
        );
        assert_eq!(
            delay_ms(BackoffKind::Exponential, 60_000, Some(100_000), 1),
            60_000
        );
    }

    #[test]
    fn test_large_attempt_saturates() {
        let delay = delay_ms(BackoffKind::Exponential, i64::MAX / 2, None, 40);
        assert_eq!(delay, i64::MAX);
    }

    #[test]
    fn test_jitter_is_deterministic_and_bounded() {
        let base = 60_000;
        let a = with_jitter(base, "job-a");
        let b = with_jitter(base, "job-a");
        assert_eq!(a, b);

        let jittered = with_jitter(base, "some-uuid");
        assert!(jittered >= (base as f64 * 0.9) as i64);
        assert!(jittered <= (base as f64 * 1.1) as i64);
    }
}
