//! Generic exponential backoff, used by the uploader client, chain adapter,
//! and resolver cascade whenever they talk to an outside service.

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Duration to wait before retry number `retry_count` (0-indexed).
    ///
    /// `initial_backoff * multiplier^retry_count`, capped at `max_backoff_ms`.
    pub fn backoff(&self, retry_count: u32) -> std::time::Duration {
        let backoff =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(retry_count as i32);
        let capped = backoff.min(self.max_backoff_ms as f64).max(0.0) as u64;
        std::time::Duration::from_millis(capped)
    }

    pub fn should_retry(&self, retryable: bool, retry_count: u32) -> bool {
        retryable && retry_count < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            initial_backoff_ms: 250,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Run `f` with retries governed by `policy`. `f` returns `Ok` on success or
/// `Err((retryable, error))`; the last error is returned if retries are
/// exhausted.
pub async fn with_retries<T, E, F, Fut>(policy: &RetryPolicy, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, (bool, E)>>,
{
    let mut retry_count = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err((retryable, err)) => {
                if policy.should_retry(retryable, retry_count) {
                    tokio::time::sleep(policy.backoff(retry_count)).await;
                    retry_count += 1;
                    continue;
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.backoff(0).as_millis(), 100);
        assert_eq!(policy.backoff(1).as_millis(), 200);
        assert_eq!(policy.backoff(2).as_millis(), 400);
        assert_eq!(policy.backoff(5).as_millis(), 1000);
    }

    #[test]
    fn should_retry_respects_max_and_retryability() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..Default::default()
        };
        assert!(policy.should_retry(true, 0));
        assert!(policy.should_retry(true, 1));
        assert!(!policy.should_retry(true, 2));
        assert!(!policy.should_retry(false, 0));
    }

    #[tokio::test]
    async fn with_retries_eventually_succeeds() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            backoff_multiplier: 1.0,
        };
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<u32, &str> = with_retries(&policy, || {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err((true, "not yet"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(2));
    }
}
