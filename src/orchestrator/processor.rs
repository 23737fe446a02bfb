//! Request processor — composes gate → admission → fallback per request.
//!
//! Flow for every content-triggered operation:
//! 1. Extract signals (collaborator, pure I/O)
//! 2. Classification gate → only an automatic verdict proceeds
//! 3. Result cache check
//! 4. Admission (per-category ceiling, single-flight key)
//! 5. Fallback execution across ranked capabilities, each attempt under
//!    its own timeout
//! 6. Cache fill

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::admission::{AdmissionController, CategoryStatus, OperationCategory};
use crate::capability::{
    invoke_with_timeout, AvailabilityProbe, CapabilityId, FallbackExecutor, TaskKind,
};
use crate::config::{ConcurrencyLimits, InferenceTimeouts};
use crate::error::{CapabilityError, Result};
use crate::gate::{classify, GateAction, TriggerKind};
use crate::orchestrator::types::{
    InferenceClient, InferenceRequest, OrchestratorEvent, PolicyStore, RequestOutcome,
    ResultCache, SignalExtractor,
};

/// Capacity of the event broadcast channel; slow subscribers lag, the
/// orchestrator never blocks on them.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Collaborators injected into the orchestrator.
pub struct OrchestratorDeps {
    pub extractor: Arc<dyn SignalExtractor>,
    pub policy: Arc<dyn PolicyStore>,
    pub cache: Arc<dyn ResultCache>,
    pub client: Arc<dyn InferenceClient>,
    pub probe: Arc<dyn AvailabilityProbe>,
}

/// The request-orchestration core: decides whether content is processed,
/// admits work under bounded concurrency, and executes it with fallback
/// across inference capabilities.
///
/// One explicit instance per process, passed by reference — no global
/// registries. Tests construct isolated instances.
pub struct Orchestrator {
    extractor: Arc<dyn SignalExtractor>,
    policy: Arc<dyn PolicyStore>,
    cache: Arc<dyn ResultCache>,
    client: Arc<dyn InferenceClient>,
    admission: AdmissionController,
    fallback: Arc<FallbackExecutor>,
    timeouts: InferenceTimeouts,
    cache_ttl: Option<Duration>,
    events_tx: broadcast::Sender<OrchestratorEvent>,
}

impl Orchestrator {
    /// Create an orchestrator with the given collaborators and limits.
    pub fn new(
        deps: OrchestratorDeps,
        limits: ConcurrencyLimits,
        timeouts: InferenceTimeouts,
        cache_ttl: Option<Duration>,
    ) -> Self {
        Self {
            extractor: deps.extractor,
            policy: deps.policy,
            cache: deps.cache,
            client: deps.client,
            admission: AdmissionController::new(limits),
            fallback: Arc::new(FallbackExecutor::new(deps.probe)),
            timeouts,
            cache_ttl,
            events_tx: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to orchestrator notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events_tx.subscribe()
    }

    /// Fire-and-forget event emission.
    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Summarize a document.
    pub async fn summarize(
        &self,
        source: &str,
        trigger: TriggerKind,
        force: bool,
    ) -> Result<RequestOutcome> {
        self.process(
            source,
            trigger,
            force,
            OperationCategory::Summarization,
            TaskKind::Summarization,
            None,
            "summary",
        )
        .await
    }

    /// Index a document's content.
    pub async fn index(
        &self,
        source: &str,
        trigger: TriggerKind,
        force: bool,
    ) -> Result<RequestOutcome> {
        self.process(
            source,
            trigger,
            force,
            OperationCategory::Indexing,
            TaskKind::Indexing,
            None,
            "index",
        )
        .await
    }

    /// Answer a question about a document. User-initiated, so it carries
    /// manual intent through the gate.
    pub async fn answer(&self, source: &str, question: &str) -> Result<RequestOutcome> {
        self.process(
            source,
            TriggerKind::Manual,
            false,
            OperationCategory::Query,
            TaskKind::Question,
            Some(question),
            "answer",
        )
        .await
    }

    /// Look up a word or phrase from a document. User-initiated.
    pub async fn lookup(&self, source: &str, term: &str) -> Result<RequestOutcome> {
        self.process(
            source,
            TriggerKind::Manual,
            false,
            OperationCategory::Query,
            TaskKind::WordLookup,
            Some(term),
            "lookup",
        )
        .await
    }

    /// Cancel the operation for a source in a category.
    pub async fn cancel(&self, category: OperationCategory, source: &str) -> bool {
        self.admission.cancel(category, source).await
    }

    /// Cancel every operation in a category.
    pub async fn cancel_all(&self, category: OperationCategory) {
        self.admission.cancel_all(category).await;
    }

    /// Per-category `{active, queued}` snapshot.
    pub async fn status(&self) -> HashMap<OperationCategory, CategoryStatus> {
        self.admission.status().await
    }

    /// Whether an operation for the source is currently executing.
    pub async fn is_running(&self, category: OperationCategory, source: &str) -> bool {
        self.admission.is_running(category, source).await
    }

    /// The best capability for a task right now, if any.
    pub async fn select_best(&self, task: TaskKind) -> Result<Option<CapabilityId>> {
        Ok(self.fallback.select_best(task).await?)
    }

    /// Access to the admission controller.
    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Access to the fallback executor (pinning, selection).
    pub fn fallback(&self) -> &FallbackExecutor {
        &self.fallback
    }

    async fn process(
        &self,
        source: &str,
        trigger: TriggerKind,
        force: bool,
        category: OperationCategory,
        task: TaskKind,
        detail: Option<&str>,
        cache_tag: &str,
    ) -> Result<RequestOutcome> {
        let document = self.extractor.extract(source).await?;
        let policy = self.policy.load().await?;

        let verdict = classify(&document.profile, &policy, trigger, force);
        debug!(source, action = ?verdict.action, reason = %verdict.reason, "gate verdict");
        match verdict.action {
            GateAction::Skip => {
                self.emit(OrchestratorEvent::Skipped {
                    source: source.to_string(),
                    reason: verdict.reason,
                });
                return Ok(RequestOutcome::Skipped {
                    reason: verdict.reason,
                });
            }
            GateAction::Prompt => {
                self.emit(OrchestratorEvent::PromptNeeded {
                    source: source.to_string(),
                    reason: verdict.reason,
                });
                return Ok(RequestOutcome::NeedsPrompt {
                    reason: verdict.reason,
                });
            }
            GateAction::Wait => {
                self.emit(OrchestratorEvent::Deferred {
                    source: source.to_string(),
                    reason: verdict.reason,
                });
                return Ok(RequestOutcome::Deferred {
                    reason: verdict.reason,
                });
            }
            GateAction::Automatic => {}
        }

        let cache_key = match detail {
            Some(detail) => format!("{cache_tag}:{source}:{detail}"),
            None => format!("{cache_tag}:{source}"),
        };
        if let Some(hit) = self.cache.get(&cache_key).await {
            debug!(source, key = %cache_key, "result cache hit");
            self.emit(OrchestratorEvent::Completed {
                source: source.to_string(),
                category,
                cached: true,
            });
            return Ok(RequestOutcome::Completed {
                output: hit,
                cached: true,
            });
        }

        let request = InferenceRequest {
            task,
            input: document.text,
            detail: detail.map(str::to_string),
        };
        let timeout = self.timeouts.for_payload(request.input.chars().count());

        self.emit(OrchestratorEvent::Started {
            source: source.to_string(),
            category,
        });

        let fallback = Arc::clone(&self.fallback);
        let client = Arc::clone(&self.client);
        let submitted = self
            .admission
            .submit(category, source, move |token| async move {
                let output = fallback
                    .try_with_fallback(task, |capability| {
                        let client = Arc::clone(&client);
                        let request = &request;
                        let token = token.clone();
                        async move {
                            // Cooperative cancellation checkpoint before
                            // each attempt.
                            if token.is_cancelled() {
                                return Err(CapabilityError::RequestFailed {
                                    capability,
                                    reason: "operation cancelled".into(),
                                });
                            }
                            invoke_with_timeout(
                                &capability,
                                timeout,
                                client.run(&capability, request),
                            )
                            .await
                        }
                    })
                    .await?;
                Ok(output)
            })
            .await;

        let output = match submitted {
            Ok(output) => output,
            Err(error) => {
                self.emit(OrchestratorEvent::Failed {
                    source: source.to_string(),
                    category,
                    error: error.to_string(),
                });
                return Err(error);
            }
        };

        info!(source, %category, %task, "request completed");
        self.cache.set(&cache_key, &output, self.cache_ttl).await;
        self.emit(OrchestratorEvent::Completed {
            source: source.to_string(),
            category,
            cached: false,
        });
        Ok(RequestOutcome::Completed {
            output,
            cached: false,
        })
    }
}
