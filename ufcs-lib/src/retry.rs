//! Bounded resend of one logical exchange.

use crate::error::{Result, UfcsError};
use std::time::Duration;
use tracing::warn;

/// Blocking pause, injectable so timing can be observed in tests.
pub trait Delay {
    fn delay(&mut self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested pauses without sleeping.
#[derive(Debug, Clone, Default)]
pub struct NoDelay {
    pub requested: Vec<Duration>,
}

impl Delay for NoDelay {
    fn delay(&mut self, duration: Duration) {
        self.requested.push(duration);
    }
}

impl<D: Delay + ?Sized> Delay for &mut D {
    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first send included
    pub max_attempts: u8,
    /// Pause between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u8, backoff: Duration) -> Self {
        Self { max_attempts, backoff }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` attempts have been made.
///
/// `op` receives the 1-based attempt number. Only [`UfcsError::Timeout`] and
/// [`UfcsError::Nack`] trigger another attempt; exhausting the budget yields
/// [`UfcsError::ExchangeFailed`] carrying the last failure.
pub fn retry<T, D, F>(policy: &RetryPolicy, delay: &mut D, label: &str, mut op: F) -> Result<T>
where
    D: Delay + ?Sized,
    F: FnMut(u8) -> Result<T>,
{
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                if attempt >= policy.max_attempts {
                    return Err(UfcsError::ExchangeFailed {
                        message: label.to_string(),
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                warn!("{} attempt {} failed: {}, retrying", label, attempt, err);
                delay.delay(policy.backoff);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeds_first_try() {
        let mut delay = NoDelay::default();
        let policy = RetryPolicy::new(3, Duration::from_millis(5));
        let value = retry(&policy, &mut delay, "ping", |_| Ok(7)).unwrap();
        assert_eq!(value, 7);
        assert!(delay.requested.is_empty());
    }

    #[test]
    fn test_exhausts_exact_budget() {
        let mut delay = NoDelay::default();
        let policy = RetryPolicy::new(3, Duration::from_millis(5));
        let mut calls = 0;
        let err = retry(&policy, &mut delay, "ping", |_| -> Result<()> {
            calls += 1;
            Err(UfcsError::Nack)
        })
        .unwrap_err();
        assert_eq!(calls, 3);
        assert_eq!(delay.requested, vec![Duration::from_millis(5); 2]);
        match err {
            UfcsError::ExchangeFailed { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, UfcsError::Nack));
            }
            other => panic!("Expected ExchangeFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_recovers_after_timeout() {
        let mut delay = NoDelay::default();
        let policy = RetryPolicy::new(4, Duration::ZERO);
        let value = retry(&policy, &mut delay, "request", |attempt| {
            if attempt < 3 { Err(UfcsError::Timeout) } else { Ok(attempt) }
        })
        .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn test_fatal_error_not_retried() {
        let mut delay = NoDelay::default();
        let policy = RetryPolicy::new(4, Duration::ZERO);
        let mut calls = 0;
        let err = retry(&policy, &mut delay, "request", |_| -> Result<()> {
            calls += 1;
            Err(UfcsError::ProtocolMismatch {
                field: "cmd",
                expected: 1,
                actual: 3,
            })
        })
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, UfcsError::ProtocolMismatch { .. }));
    }
}
