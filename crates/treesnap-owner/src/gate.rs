//! Semaphore-gated blocking I/O.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

use crate::error::StrategyError;

/// Why a gated call did not produce a value.
#[derive(Debug, Error)]
pub enum GateError {
    /// The gate was closed.
    #[error("I/O gate closed")]
    Closed,

    /// The blocking closure panicked.
    #[error("blocking task panicked: {0}")]
    Panicked(String),

    /// The blocking task was cancelled by the runtime.
    #[error("blocking task cancelled")]
    Cancelled,
}

impl From<JoinError> for GateError {
    fn from(error: JoinError) -> Self {
        if error.is_panic() {
            Self::Panicked(error.to_string())
        } else {
            Self::Cancelled
        }
    }
}

impl From<GateError> for StrategyError {
    fn from(error: GateError) -> Self {
        match error {
            GateError::Cancelled => StrategyError::Cancelled,
            other => StrategyError::Unexpected(other.to_string()),
        }
    }
}

/// Limits how many blocking filesystem calls run at once.
///
/// Every directory listing, stat, owner lookup, format read and archive
/// listing goes through one shared gate, so the number of busy blocking
/// threads never exceeds the permit count however wide the tree is.
#[derive(Debug, Clone)]
pub struct IoGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl IoGate {
    /// Create a gate allowing `capacity` concurrent calls (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Number of permits.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run a blocking closure once a permit is free.
    pub async fn run<T, F>(&self, f: F) -> Result<T, GateError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self.permits.acquire().await.map_err(|_| GateError::Closed)?;
        Ok(tokio::task::spawn_blocking(f).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_gate_bounds_concurrency() {
        let gate = IoGate::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let gate = gate.clone();
            let running = running.clone();
            let peak = peak.clone();
            tasks.spawn(async move {
                gate.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn test_gate_reports_panics() {
        let gate = IoGate::new(1);
        let result: Result<(), _> = gate.run(|| panic!("boom")).await;
        assert!(matches!(result, Err(GateError::Panicked(_))));
        assert_eq!(gate.available(), 1);
    }
}
