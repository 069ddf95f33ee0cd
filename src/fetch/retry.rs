use crate::config::RetryConfig;
use crate::fetch::FetchError;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;

/// Retry and backoff rules for the fetch executor
///
/// Delay after the k-th failed attempt (1-based):
/// ```text
/// delay = min(base_delay * multiplier^(k-1), max_delay) + random_jitter(0..=jitter)
/// ```
/// A 429 carrying `Retry-After` waits for that duration instead, capped at
/// `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Per-attempt ceiling, also applied to `Retry-After`
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to each backoff
    pub jitter: Duration,
    /// Retry 429 responses that carry no `Retry-After` header
    pub retry_rate_limited_without_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
            retry_rate_limited_without_retry_after: config.retry_rate_limited_without_retry_after,
        }
    }

    /// Whether `error` may be retried at all
    pub fn is_retryable(&self, error: &FetchError) -> bool {
        match error {
            FetchError::RateLimited {
                retry_after: None, ..
            } => self.retry_rate_limited_without_retry_after,
            other => other.is_transient(),
        }
    }

    /// Whether another attempt should follow the failed `attempt` (1-based)
    pub fn should_retry(&self, error: &FetchError, attempt: u32) -> bool {
        attempt < self.max_attempts && self.is_retryable(error)
    }

    /// Exponential backoff for the failed `attempt`, without jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let ceiling = self.max_delay.as_millis() as f64;

        if !millis.is_finite() || millis >= ceiling {
            self.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    /// Full wait before the next attempt
    pub fn delay_for(&self, attempt: u32, error: &FetchError) -> Duration {
        if let FetchError::RateLimited {
            retry_after: Some(wait),
            ..
        } = error
        {
            return (*wait).min(self.max_delay);
        }

        self.backoff(attempt) + self.random_jitter()
    }

    fn random_jitter(&self) -> Duration {
        let max = self.jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

/// Parses a `Retry-After` header value
///
/// Accepts delta-seconds or an HTTP-date. Dates in the past yield zero.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = date.with_timezone(&Utc) - now;
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_default_backoff_sequence() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(6), Duration::from_secs(30));
        assert_eq!(policy.backoff(200), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.delay_for(1, &FetchError::Timeout);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_should_retry_respects_attempt_budget() {
        let policy = policy();
        assert!(policy.should_retry(&FetchError::Timeout, 1));
        assert!(policy.should_retry(&FetchError::Timeout, 2));
        assert!(!policy.should_retry(&FetchError::Timeout, 3));
        assert!(!policy.should_retry(&FetchError::ClientError { status: 404 }, 1));
    }

    #[test]
    fn test_retry_after_is_honored_and_capped() {
        let policy = policy();
        let short = FetchError::RateLimited {
            status: 429,
            retry_after: Some(Duration::from_secs(7)),
        };
        let long = FetchError::RateLimited {
            status: 429,
            retry_after: Some(Duration::from_secs(600)),
        };

        assert_eq!(policy.delay_for(1, &short), Duration::from_secs(7));
        assert_eq!(policy.delay_for(1, &long), Duration::from_secs(30));
    }

    #[test]
    fn test_rate_limited_without_header_switch() {
        let bare = FetchError::RateLimited {
            status: 429,
            retry_after: None,
        };

        assert!(policy().is_retryable(&bare));

        let strict = RetryPolicy {
            retry_rate_limited_without_retry_after: false,
            ..policy()
        };
        assert!(!strict.is_retryable(&bare));
    }

    #[test]
    fn test_parse_retry_after() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 0).unwrap();

        assert_eq!(parse_retry_after("120", now), Some(Duration::from_secs(120)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }
}
