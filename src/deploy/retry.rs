//! Deployment retry policy.

use std::time::Duration;

/// Error fragments that mean the sandbox session itself is gone.
const SESSION_LOST_MARKERS: &[&str] = &[
    "connection lost",
    "network connection",
    "connection reset",
    "connection refused",
    "socket hang up",
    "broken pipe",
    "durable object reset",
    "storage error",
];

/// Delay before the next retry, where `retries_left` still counts that retry.
///
/// `base * 2^(max_retries - retries_left)`, so the first retry waits `base`.
pub fn backoff_delay(max_retries: u32, retries_left: u32, base: Duration) -> Duration {
    let exponent = max_retries.saturating_sub(retries_left);
    base.saturating_mul(2u32.saturating_pow(exponent))
}

/// Every delay a deployment sleeps through if all attempts fail.
pub fn backoff_schedule(max_retries: u32, base: Duration) -> Vec<Duration> {
    (1..=max_retries)
        .rev()
        .map(|left| backoff_delay(max_retries, left, base))
        .collect()
}

/// Whether an error means the next attempt needs a brand-new session.
pub fn requires_session_reset(message: &str) -> bool {
    let lower = message.to_lowercase();
    SESSION_LOST_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule_doubles_from_base() {
        let schedule = backoff_schedule(3, Duration::from_millis(1000));
        assert_eq!(
            schedule,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
            ]
        );
    }

    #[test]
    fn test_backoff_delay_first_retry_waits_base() {
        let base = Duration::from_millis(250);
        assert_eq!(backoff_delay(3, 3, base), base);
        assert_eq!(backoff_delay(3, 1, base), Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_zero_retries_has_no_schedule() {
        assert!(backoff_schedule(0, Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_requires_session_reset() {
        assert!(requires_session_reset("Sandbox error: Network connection lost."));
        assert!(requires_session_reset("ECONNRESET: Connection reset by peer"));
        assert!(!requires_session_reset("Sandbox returned 400: bad template"));
    }
}
