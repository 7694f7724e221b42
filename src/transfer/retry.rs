use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::platform::PlatformError;

/// Bounded exponential backoff for rate-limited platform calls.
///
/// Only `RateLimited` errors are retried; every other error is returned to
/// the caller on the first occurrence. A `Retry-After` hint from the platform
/// takes precedence over the computed delay, capped at the maximum.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Delay before the given retry, zero-based: attempt 0 is the first
    /// retry after the initial failure.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.max_backoff),
            None => self.backoff_for(attempt),
        }
    }
}

pub async fn with_rate_limit_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, PlatformError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PlatformError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(PlatformError::RateLimited { retry_after }) => {
                if attempt + 1 >= policy.max_attempts {
                    return Err(PlatformError::RateLimited { retry_after });
                }
                let delay = policy.delay_for(attempt, retry_after);
                debug!(
                    "{} rate limited, retrying in {:?} (attempt {}/{})",
                    what,
                    delay,
                    attempt + 1,
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
