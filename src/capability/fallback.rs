//! Fallback executor — walks the ranked candidate list until one succeeds.
//!
//! Every intermediate candidate failure (including timeouts) is absorbed
//! and logged; only total exhaustion surfaces to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::capability::ranking::{rank_candidates, CapabilityId, TaskKind};
use crate::error::CapabilityError;

/// Reports the currently reachable capability set.
///
/// Implementations are expected to keep their own short-lived freshness
/// cache — the executor probes on every selection.
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    async fn available(&self) -> Result<Vec<CapabilityId>, CapabilityError>;
}

/// Selects the best capability for a task and retries a unit of work
/// across candidates until one succeeds.
pub struct FallbackExecutor {
    probe: Arc<dyn AvailabilityProbe>,
    pinned: RwLock<Option<CapabilityId>>,
}

impl FallbackExecutor {
    /// Create an executor over the given availability probe.
    pub fn new(probe: Arc<dyn AvailabilityProbe>) -> Self {
        Self {
            probe,
            pinned: RwLock::new(None),
        }
    }

    /// Pin a capability: it becomes the sole candidate for every task
    /// until the pin is cleared.
    pub async fn pin(&self, capability: impl Into<CapabilityId>) {
        let capability = capability.into();
        debug!(%capability, "pinning capability");
        *self.pinned.write().await = Some(capability);
    }

    /// Clear the pin, restoring hint-based ranking.
    pub async fn clear_pin(&self) {
        *self.pinned.write().await = None;
    }

    /// The currently pinned capability, if any.
    pub async fn pinned(&self) -> Option<CapabilityId> {
        self.pinned.read().await.clone()
    }

    /// The best candidate for a task, or `None` when nothing is available.
    pub async fn select_best(&self, task: TaskKind) -> Result<Option<CapabilityId>, CapabilityError> {
        Ok(self.candidates(task).await?.into_iter().next())
    }

    /// Run `work` against candidates in ranked order, returning the first
    /// success.
    ///
    /// Fails with [`CapabilityError::NoneAvailable`] when there is no
    /// candidate at all, and with [`CapabilityError::Exhausted`] (naming
    /// the attempt count) when every candidate failed.
    pub async fn try_with_fallback<T, F, Fut>(
        &self,
        task: TaskKind,
        work: F,
    ) -> Result<T, CapabilityError>
    where
        F: Fn(CapabilityId) -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        let candidates = self.candidates(task).await?;
        if candidates.is_empty() {
            return Err(CapabilityError::NoneAvailable);
        }

        let mut attempts = 0;
        for capability in candidates {
            attempts += 1;
            match work(capability.clone()).await {
                Ok(value) => {
                    debug!(%task, %capability, attempts, "capability attempt succeeded");
                    return Ok(value);
                }
                Err(error) => {
                    warn!(%task, %capability, %error, "capability attempt failed, trying next");
                }
            }
        }

        Err(CapabilityError::Exhausted {
            task: task.label(),
            attempts,
        })
    }

    async fn candidates(&self, task: TaskKind) -> Result<Vec<CapabilityId>, CapabilityError> {
        let available = self.probe.available().await?;
        let pinned = self.pinned.read().await.clone();
        Ok(rank_candidates(task, &available, pinned.as_deref()))
    }
}

/// Run one capability invocation under a timeout.
///
/// A timeout is an ordinary single-candidate failure; the fallback loop
/// absorbs it like any other.
pub async fn invoke_with_timeout<T, Fut>(
    capability: &str,
    timeout: Duration,
    fut: Fut,
) -> Result<T, CapabilityError>
where
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| CapabilityError::Timeout {
            capability: capability.to_string(),
            timeout,
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProbe {
        available: Vec<CapabilityId>,
    }

    impl FixedProbe {
        fn new(names: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                available: names.iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    #[async_trait]
    impl AvailabilityProbe for FixedProbe {
        async fn available(&self) -> Result<Vec<CapabilityId>, CapabilityError> {
            Ok(self.available.clone())
        }
    }

    #[tokio::test]
    async fn select_best_follows_hints() {
        let executor = FallbackExecutor::new(FixedProbe::new(&["small-model-a", "other-9b"]));
        let best = executor.select_best(TaskKind::WordLookup).await.unwrap();
        assert_eq!(best.as_deref(), Some("small-model-a"));
    }

    #[tokio::test]
    async fn select_best_none_when_empty() {
        let executor = FallbackExecutor::new(FixedProbe::new(&[]));
        assert!(executor.select_best(TaskKind::Question).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pin_overrides_ranking() {
        let executor = FallbackExecutor::new(FixedProbe::new(&["small-model-a", "llama-70b"]));
        executor.pin("llama-70b").await;
        let best = executor.select_best(TaskKind::WordLookup).await.unwrap();
        assert_eq!(best.as_deref(), Some("llama-70b"));

        executor.clear_pin().await;
        let best = executor.select_best(TaskKind::WordLookup).await.unwrap();
        assert_eq!(best.as_deref(), Some("small-model-a"));
    }

    #[tokio::test]
    async fn returns_first_success() {
        let executor = FallbackExecutor::new(FixedProbe::new(&["cap-a", "cap-b", "cap-c"]));
        let calls = AtomicUsize::new(0);

        let result = executor
            .try_with_fallback(TaskKind::Question, |capability| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CapabilityError::RequestFailed {
                            capability,
                            reason: "boom".into(),
                        })
                    } else {
                        Ok(format!("answer from {capability}"))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "answer from cap-c");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_names_attempt_count() {
        let executor = FallbackExecutor::new(FixedProbe::new(&["cap-a", "cap-b", "cap-c"]));

        let result: Result<(), _> = executor
            .try_with_fallback(TaskKind::Summarization, |capability| async move {
                Err(CapabilityError::RequestFailed {
                    capability,
                    reason: "down".into(),
                })
            })
            .await;

        match result {
            Err(CapabilityError::Exhausted { attempts, task }) => {
                assert_eq!(attempts, 3);
                assert_eq!(task, "summarization");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_set_fails_without_attempting() {
        let executor = FallbackExecutor::new(FixedProbe::new(&[]));
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = executor
            .try_with_fallback(TaskKind::Indexing, |_capability| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(CapabilityError::NoneAvailable)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn timeout_is_absorbed_like_any_failure() {
        let executor = FallbackExecutor::new(FixedProbe::new(&["slow-cap", "fast-cap"]));

        let result = executor
            .try_with_fallback(TaskKind::Question, |capability| async move {
                if capability == "slow-cap" {
                    invoke_with_timeout(&capability, Duration::from_millis(10), async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok("never".to_string())
                    })
                    .await
                } else {
                    Ok("quick".to_string())
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "quick");
    }
}
