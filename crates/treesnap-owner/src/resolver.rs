//! Owner resolution pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use treesnap_core::{Owner, ScanConfig};

use crate::gate::{GateError, IoGate};
use crate::registry::StrategyRegistry;
use crate::retry::{RetryError, RetryPolicy};
use crate::source::{FsOwnerSource, normalize_account};
use crate::strategy::OwnerSource;

/// Resolves the owner attribute of one entry.
///
/// Files first go through the format strategy registered for their
/// extension class; on any classified failure resolution falls back to the
/// filesystem owner, which is retried on transient errors. Resolution never
/// fails: every outcome maps to an [`Owner`], degraded ones included.
#[derive(Clone)]
pub struct AttributeResolver {
    registry: Arc<StrategyRegistry>,
    source: Arc<dyn OwnerSource>,
    retry: RetryPolicy,
    gate: IoGate,
}

impl AttributeResolver {
    /// Create a resolver from its parts.
    pub fn new(
        registry: StrategyRegistry,
        source: Arc<dyn OwnerSource>,
        retry: RetryPolicy,
        gate: IoGate,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            source,
            retry,
            gate,
        }
    }

    /// Resolver with the built-in readers and the filesystem owner source.
    pub fn from_config(config: &ScanConfig, gate: IoGate) -> Self {
        Self::new(
            StrategyRegistry::with_defaults(config.formats.clone()),
            Arc::new(FsOwnerSource::new()),
            RetryPolicy::new(config.retry),
            gate,
        )
    }

    /// Replace the owner source.
    pub fn with_source(mut self, source: Arc<dyn OwnerSource>) -> Self {
        self.source = source;
        self
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Gate shared with the walker.
    pub fn gate(&self) -> &IoGate {
        &self.gate
    }

    /// Resolve the owner of a file.
    pub async fn resolve(&self, path: &Path, cancel: &CancellationToken) -> Owner {
        if cancel.is_cancelled() {
            return Owner::Unretrievable;
        }

        if let Some((class, strategy)) = self.registry.strategy_for(path) {
            let owned = path.to_path_buf();
            let name = strategy.name();
            let outcome = self.gate.run(move || strategy.read_author(&owned)).await;
            match outcome {
                Ok(Ok(author)) => return Owner::Resolved(author),
                Ok(Err(error)) if error.is_unexpected() => {
                    debug!(path = %path.display(), strategy = name, %error, "author strategy failed unexpectedly");
                    return Owner::Unretrievable;
                }
                Ok(Err(error)) => {
                    debug!(path = %path.display(), %class, strategy = name, %error, "no author, falling back to owner");
                }
                Err(GateError::Cancelled) => return Owner::Unretrievable,
                Err(error) => {
                    debug!(path = %path.display(), strategy = name, %error, "author strategy aborted");
                    return Owner::Unretrievable;
                }
            }
        }

        self.resolve_owner(path, cancel).await
    }

    /// Resolve the filesystem owner only, as used for directories.
    pub async fn resolve_owner(&self, path: &Path, cancel: &CancellationToken) -> Owner {
        let path: Arc<PathBuf> = Arc::new(path.to_path_buf());
        let result = self
            .retry
            .run(cancel, |_attempt| {
                let source = Arc::clone(&self.source);
                let path = Arc::clone(&path);
                let gate = self.gate.clone();
                async move { gate.run(move || source.owner(&path)).await? }
            })
            .await;

        match result {
            Ok(Some(raw)) => {
                let account = normalize_account(raw.trim());
                if account.is_empty() {
                    Owner::Unknown
                } else {
                    Owner::Resolved(account.to_string())
                }
            }
            Ok(None) => Owner::Unknown,
            Err(RetryError::Exhausted { attempts, source }) => {
                debug!(path = %path.display(), attempts, error = %source, "owner lookup kept failing");
                Owner::TransientFailure
            }
            Err(RetryError::Permanent(error)) if error.is_unexpected() => {
                debug!(path = %path.display(), %error, "owner lookup failed unexpectedly");
                Owner::Unretrievable
            }
            Err(RetryError::Permanent(error)) => {
                debug!(path = %path.display(), %error, "owner unavailable");
                Owner::Unknown
            }
            Err(RetryError::Cancelled) => Owner::Unretrievable,
        }
    }
}

impl std::fmt::Debug for AttributeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeResolver")
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrategyError;
    use std::time::Duration;
    use treesnap_core::FormatTable;

    struct Fixed(Result<Option<&'static str>, fn() -> StrategyError>);

    impl OwnerSource for Fixed {
        fn owner(&self, _path: &Path) -> Result<Option<String>, StrategyError> {
            match &self.0 {
                Ok(value) => Ok(value.map(str::to_string)),
                Err(make) => Err(make()),
            }
        }
    }

    fn resolver(source: Fixed) -> AttributeResolver {
        AttributeResolver::new(
            StrategyRegistry::new(FormatTable::default()),
            Arc::new(source),
            RetryPolicy::with(3, 2, Duration::from_millis(1)),
            IoGate::new(2),
        )
    }

    #[tokio::test]
    async fn test_normalizes_account() {
        let owner = resolver(Fixed(Ok(Some("CORP\\alice"))))
            .resolve(Path::new("a.txt"), &CancellationToken::new())
            .await;
        assert_eq!(owner, Owner::Resolved("alice".to_string()));
    }

    #[tokio::test]
    async fn test_missing_owner_is_unknown() {
        let cancel = CancellationToken::new();
        let owner = resolver(Fixed(Ok(None)))
            .resolve(Path::new("a.txt"), &cancel)
            .await;
        assert_eq!(owner, Owner::Unknown);

        let owner = resolver(Fixed(Ok(Some("DOMAIN\\"))))
            .resolve(Path::new("a.txt"), &cancel)
            .await;
        assert_eq!(owner, Owner::Unknown);
    }

    #[tokio::test]
    async fn test_unexpected_source_failure() {
        let owner = resolver(Fixed(Err(|| StrategyError::Unexpected("bad sid".into()))))
            .resolve(Path::new("a.txt"), &CancellationToken::new())
            .await;
        assert_eq!(owner, Owner::Unretrievable);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let owner = resolver(Fixed(Ok(Some("alice"))))
            .resolve(Path::new("a.txt"), &cancel)
            .await;
        assert_eq!(owner, Owner::Unretrievable);
    }
}
