//! Bounded retry with exponential backoff
//!
//! Only errors that report themselves as retryable are retried; everything
//! else fails on the first attempt.

use super::error::DatabaseError;
use std::fmt::Display;
use std::future::Future;
use tokio::time::Duration;

pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for DatabaseError {
    fn is_retryable(&self) -> bool {
        self.is_busy() || matches!(self, DatabaseError::StaleWrite { .. })
    }
}

/// Run `op` once, then retry it up to `retries` more times
///
/// Waits 10ms, 20ms, 40ms, ... between attempts.
pub async fn with_retry<T, E, F, Fut>(label: &str, retries: usize, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let attempts = retries + 1;
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!("{} succeeded after {} retry(ies)", label, attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                tracing::debug!(
                    "{} failed on attempt {}/{}: {}. Retrying...",
                    label,
                    attempt + 1,
                    attempts,
                    e
                );

                let backoff_ms = 10u64 * (1 << attempt);
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!("{} gave up after {} attempts: {}", label, attempts, e);
                }
                return Err(e);
            }
        }
    }
}
