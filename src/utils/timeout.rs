//! Timeout utilities
//!
//! Bounds activations that might otherwise never report completion.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Execute operation with custom timeout
pub async fn with_custom_timeout<F, T>(
    operation: F,
    duration: Duration,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    timeout(duration, operation).await
}

/// Execute operation with a timeout only when one is configured
///
/// Returns `None` if the timeout elapsed.
pub async fn with_timeout_opt<F, T>(operation: F, duration: Option<Duration>) -> Option<T>
where
    F: Future<Output = T>,
{
    match duration {
        Some(duration) => with_custom_timeout(operation, duration).await.ok(),
        None => Some(operation.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_elapses() {
        let slow = tokio::time::sleep(Duration::from_millis(200));
        assert!(with_timeout_opt(slow, Some(Duration::from_millis(10)))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_no_timeout_configured() {
        assert_eq!(with_timeout_opt(async { 7 }, None).await, Some(7));
    }
}
