//! Delay between probe attempts.

use std::time::Duration;

use rand::Rng;

use crate::config::{BackoffKind, RetryOptions};

/// Delay to wait after failed attempt number `attempt` (1-based).
pub fn retry_delay(options: &RetryOptions, attempt: u32) -> Duration {
    match options.backoff {
        BackoffKind::Fixed => options.delay,
        BackoffKind::Exponential => exponential_backoff(attempt, options.delay, options.max_delay),
    }
}

/// Exponential backoff with up to 10% jitter, capped at `max`.
pub fn exponential_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let opts = RetryOptions {
            delay: Duration::from_millis(250),
            ..Default::default()
        };
        assert_eq!(retry_delay(&opts, 1), Duration::from_millis(250));
        assert_eq!(retry_delay(&opts, 4), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_growth_and_cap() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1000);

        let b1 = exponential_backoff(1, base, max);
        assert!(b1 >= Duration::from_millis(100) && b1 < Duration::from_millis(110));

        let b2 = exponential_backoff(2, base, max);
        assert!(b2 >= Duration::from_millis(200));

        let capped = exponential_backoff(10, base, max);
        assert!(capped >= max && capped < Duration::from_millis(1100));

        assert_eq!(exponential_backoff(0, base, max), Duration::ZERO);
    }
}
