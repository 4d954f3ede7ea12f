use std::thread;
use std::time::Duration;

use crate::backend::EngineError;

/// Upper bound for a single retry delay, whatever the backoff.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(600);

/// Bounded retry with a fixed or growing delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first; values below 1 act as 1.
    pub max_attempts: u32,
    pub delay: Duration,
    /// Delay multiplier applied after each failed attempt.
    pub backoff: f64,
    pub retryable: fn(&EngineError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            backoff: 1.0,
            retryable: EngineError::is_transient,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. The last error is returned.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Result<T, EngineError>,
    {
        self.run_with_sleep(label, &mut op, thread::sleep)
    }

    fn run_with_sleep<T, F, S>(&self, label: &str, op: &mut F, mut sleep: S) -> Result<T, EngineError>
    where
        F: FnMut() -> Result<T, EngineError>,
        S: FnMut(Duration),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.delay;
        let mut attempt = 1;

        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && (self.retryable)(&err) => {
                    tracing::warn!(
                        %label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    sleep(delay);
                    attempt += 1;
                    if attempt < max_attempts {
                        delay = grow_delay(delay, self.backoff);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Scale `delay` by `backoff`, saturating at [`MAX_RETRY_DELAY`].
fn grow_delay(delay: Duration, backoff: f64) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    Duration::try_from_secs_f64(delay.as_secs_f64() * backoff.max(0.0))
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> EngineError {
        EngineError::Transport {
            url: "http://fake".to_string(),
            message: "timed out".to_string(),
            transient: true,
        }
    }

    fn permanent() -> EngineError {
        EngineError::Api {
            engine: "Elasticsearch",
            status: 400,
            reason: "bad request".to_string(),
            details: None,
        }
    }

    fn failing_until(success_on: u32) -> impl FnMut() -> Result<u32, EngineError> {
        let mut calls = 0;
        move || {
            calls += 1;
            if calls < success_on {
                Err(transient())
            } else {
                Ok(calls)
            }
        }
    }

    #[test]
    fn succeeds_when_last_attempt_succeeds() {
        let policy = RetryPolicy::default();
        let mut sleeps = Vec::new();
        let mut op = failing_until(3);

        let result = policy.run_with_sleep("batch", &mut op, |d| sleeps.push(d));

        assert_eq!(result.expect("success"), 3);
        assert_eq!(sleeps, vec![Duration::from_secs(1), Duration::from_secs(1)]);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::default();
        let mut sleeps = 0;
        let mut op = failing_until(4);

        let err = policy
            .run_with_sleep("batch", &mut op, |_| sleeps += 1)
            .expect_err("exhausted");

        assert!(err.is_transient());
        assert_eq!(sleeps, 2);
    }

    #[test]
    fn non_retryable_errors_fail_immediately() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let mut op = || {
            calls += 1;
            Err::<(), _>(permanent())
        };

        let err = policy
            .run_with_sleep("batch", &mut op, |_| panic!("should not sleep"))
            .expect_err("permanent");

        assert!(matches!(err, EngineError::Api { status: 400, .. }));
        assert_eq!(calls, 1);
    }

    #[test]
    fn backoff_grows_the_delay() {
        let policy = RetryPolicy {
            max_attempts: 4,
            delay: Duration::from_millis(100),
            backoff: 2.0,
            ..RetryPolicy::default()
        };
        let mut sleeps = Vec::new();
        let mut op = failing_until(4);

        policy
            .run_with_sleep("batch", &mut op, |d| sleeps.push(d))
            .expect("success");

        assert_eq!(
            sleeps,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[test]
    fn huge_backoff_saturates_instead_of_panicking() {
        let policy = RetryPolicy {
            max_attempts: 4,
            delay: Duration::from_secs(1),
            backoff: 1e20,
            ..RetryPolicy::default()
        };
        let mut sleeps = Vec::new();
        let mut op = failing_until(4);

        policy
            .run_with_sleep("batch", &mut op, |d| sleeps.push(d))
            .expect("success");

        assert_eq!(
            sleeps,
            vec![Duration::from_secs(1), MAX_RETRY_DELAY, MAX_RETRY_DELAY]
        );
    }

    #[test]
    fn grow_delay_handles_edge_values() {
        let second = Duration::from_secs(1);
        assert_eq!(grow_delay(second, f64::INFINITY), MAX_RETRY_DELAY);
        assert_eq!(grow_delay(second, 0.0), Duration::ZERO);
        assert_eq!(grow_delay(second, -3.0), Duration::ZERO);
        assert_eq!(grow_delay(Duration::ZERO, f64::INFINITY), Duration::ZERO);
        assert_eq!(grow_delay(MAX_RETRY_DELAY, 2.0), MAX_RETRY_DELAY);
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        let mut op = failing_until(1);
        assert_eq!(policy.run("batch", &mut op).expect("ok"), 1);
    }
}
