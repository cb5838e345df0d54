//! Retry with exponential backoff and jitter for transient I/O failures.

use rand::{thread_rng, Rng};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay randomized in either direction, 0.0 - 1.0.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_millis(100), max_delay: Duration::from_secs(5), jitter: 0.25 }
    }
}

/// Run `op` until it succeeds or the retry budget is exhausted. The attempt
/// index (0-based) is passed to `op` so callers can log it.
pub async fn with_backoff<F, Fut, T, E>(policy: &BackoffPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= policy.max_retries => return Err(e),
            Err(_) => {
                let exp = policy.base_delay.mul_f64(2f64.powi(attempt as i32));
                let mut delay = std::cmp::min(exp, policy.max_delay);
                if policy.jitter > 0.0 {
                    let jitter_ms = (delay.as_millis() as f64 * policy.jitter) as u64;
                    let offset: i64 = thread_rng().gen_range(-(jitter_ms as i64)..(jitter_ms as i64 + 1));
                    let base_ms = delay.as_millis() as i64 + offset;
                    delay = Duration::from_millis(base_ms.max(0) as u64);
                }
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn eventual_success() {
        let policy = BackoffPolicy { max_retries: 3, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5), jitter: 0.0 };
        let mut attempts = 0;
        let res: Result<usize, &str> = with_backoff(&policy, |_i| {
            attempts += 1;
            async move { if attempts < 3 { Err("fail") } else { Ok(7) } }
        })
        .await;
        assert_eq!(res.unwrap(), 7);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn budget_exhausted() {
        let policy = BackoffPolicy { max_retries: 2, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(2), jitter: 0.0 };
        let res: Result<(), &str> = with_backoff(&policy, |_| async { Err("always") }).await;
        assert!(res.is_err());
    }
}
