//! Exponential backoff with full jitter, for transport/transient errors.
//!
//! The teacher's `Cargo.toml` documents an `ai::retry` module
//! (`with_retry`, `RetryConfig`, `is_retryable_status`) built on `rand`,
//! whose implementation file wasn't part of the retrieved set. This
//! reimplements that contract in the same documented shape: bounded
//! attempts, exponential backoff, full jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Implemented by errors that know whether retrying makes sense (transient
/// transport failures do; a malformed request does not).
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

/// HTTP status code classification used by provider clients:
/// 408/429/5xx are retryable, everything else is not.
pub fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

/// Run `f` with exponential backoff + full jitter, up to
/// `config.max_attempts` attempts. Retries only while `op()`'s error
/// reports `is_retryable() == true`; the first non-retryable error, or
/// exhaustion of attempts, is returned immediately.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, E>
where
    E: IsRetryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < config.max_attempts && err.is_retryable() => {
                let exp = config.base_delay * 2u32.saturating_pow(attempt);
                let capped = exp.min(config.max_delay);
                let jittered = {
                    let mut rng = rand::thread_rng();
                    Duration::from_millis(rng.gen_range(0..=capped.as_millis() as u64))
                };
                tracing::warn!(
                    attempt = attempt + 1,
                    delay_ms = jittered.as_millis() as u64,
                    "retrying after transient error"
                );
                tokio::time::sleep(jittered).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);
    impl IsRetryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        let result: Result<&str, Flaky> = with_retry(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Flaky(true))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();
        let result: Result<(), Flaky> = with_retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(false)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
