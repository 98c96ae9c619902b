//! Bounded exponential backoff for transient failures.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use treesnap_core::RetryConfig;

use crate::error::StrategyError;

/// Terminal failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError {
    /// Every attempt failed transiently.
    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: StrategyError,
    },

    /// A non-transient failure ended the loop without using the budget.
    #[error(transparent)]
    Permanent(StrategyError),

    /// The cancellation token fired.
    #[error("cancelled")]
    Cancelled,
}

/// Retry policy: at most `max_attempts` calls, waiting `unit * base^n`
/// after the `n`-th failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Policy with explicit values.
    pub fn with(max_attempts: u32, base: u32, unit: Duration) -> Self {
        Self::new(RetryConfig {
            max_attempts: max_attempts.max(1),
            base,
            unit_ms: unit.as_millis() as u64,
        })
    }

    /// Maximum number of attempts.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay after the failed attempt with index `attempt` (starting at 0).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.config.delay(attempt)
    }

    /// Run `op` until it succeeds, fails permanently, or the budget runs out.
    ///
    /// `op` receives the zero-based attempt index. No wait follows the last
    /// attempt. Backoff waits end early when `cancel` fires.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StrategyError>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(StrategyError::Cancelled) => return Err(RetryError::Cancelled),
                Err(error) if error.is_transient() => {
                    if attempt + 1 >= max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt + 1,
                            source: error,
                        });
                    }
                    let delay = self.delay(attempt);
                    debug!(attempt, ?delay, %error, "transient failure, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(error) => return Err(RetryError::Permanent(error)),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> StrategyError {
        StrategyError::from_io(io::Error::new(io::ErrorKind::TimedOut, "share went away"))
    }

    #[test]
    fn test_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.max_attempts(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_uses_one_attempt() {
        let policy = RetryPolicy::with(3, 2, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy
            .run(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StrategyError::PermissionDenied) }
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::Permanent(StrategyError::PermissionDenied))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_budget() {
        let policy = RetryPolicy::with(4, 2, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy
            .run(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 4, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let policy = RetryPolicy::with(3, 2, Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = policy.run(&cancel, |_| async { Err(transient()) }).await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
    }
}
