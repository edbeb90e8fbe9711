use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{ValuationError, ValuationResult};

/// Wraps every backend round-trip with the caller's cancellation token and an
/// optional per-request timeout.
#[derive(Clone, Debug, Default)]
pub struct RequestGuard {
    token: CancellationToken,
    timeout: Option<Duration>,
}

impl RequestGuard {
    pub fn new(token: CancellationToken, timeout: Option<Duration>) -> Self {
        Self { token, timeout }
    }

    pub fn with_token(&self, token: CancellationToken) -> Self {
        Self {
            token,
            timeout: self.timeout,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub async fn run<T, F>(&self, operation: &str, call: F) -> ValuationResult<T>
    where
        F: Future<Output = ValuationResult<T>>,
    {
        if self.token.is_cancelled() {
            return Err(ValuationError::cancelled(operation.to_string()));
        }
        let bounded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                    ValuationError::unavailable(format!(
                        "{operation} timed out after {}ms",
                        limit.as_millis()
                    ))
                })?,
                None => call.await,
            }
        };
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ValuationError::cancelled(operation.to_string())),
            result = bounded => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_results_through() {
        let guard = RequestGuard::default();
        let value = guard.run("noop", async { Ok(7) }).await.expect("value");
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let guard = RequestGuard::new(token, None);
        let err = guard
            .run("scan", async { Ok::<_, ValuationError>(()) })
            .await
            .expect_err("cancelled");
        assert!(matches!(err, ValuationError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let guard = RequestGuard::new(CancellationToken::new(), Some(Duration::from_millis(10)));
        let err = guard
            .run("query", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ValuationError>(())
            })
            .await
            .expect_err("timeout");
        assert!(matches!(err, ValuationError::BackendUnavailable { .. }));
    }
}
