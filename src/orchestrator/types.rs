//! Shared types and collaborator seams for the orchestrator.
//!
//! Collaborators are pure I/O boundaries — signal extraction, policy
//! persistence, result caching, and backend transport all live behind
//! these traits. Orchestration logic lives in `processor`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::admission::OperationCategory;
use crate::capability::{CapabilityId, TaskKind};
use crate::config::PolicyConfig;
use crate::error::{CapabilityError, ExtractError, PolicyError};
use crate::gate::{DocumentProfile, GateReason};

/// A fetched document with its structural signals and extracted text.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Profile fed to the classification gate.
    pub profile: DocumentProfile,
    /// Extracted text content, the payload for inference.
    pub text: String,
}

/// Fetches a source and derives its content signals.
#[async_trait]
pub trait SignalExtractor: Send + Sync {
    async fn extract(&self, source: &str) -> Result<ExtractedDocument, ExtractError>;
}

/// Supplies and persists the user's processing policy.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn load(&self) -> Result<PolicyConfig, PolicyError>;

    async fn save(&self, policy: &PolicyConfig) -> Result<(), PolicyError>;
}

/// Keyed result cache with optional expiry, consulted before and filled
/// after execution. Misses are `None`; the cache never fails a request.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>);
}

/// One inference request, ready to hand to a capability.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    /// Kind of work, for backend-side routing and prompting.
    pub task: TaskKind,
    /// Document text payload.
    pub input: String,
    /// Question or term for query-style tasks.
    pub detail: Option<String>,
}

/// Transport seam to the inference backends.
///
/// Implementations own all network mechanics (and their own retries below
/// the capability level); the orchestrator only sees text in, text out.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn run(
        &self,
        capability: &CapabilityId,
        request: &InferenceRequest,
    ) -> Result<String, CapabilityError>;
}

/// User-visible outcome of an orchestrated request.
///
/// Skip and wait verdicts are ordinary outcomes ("nothing happened, here's
/// why"), never errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Work ran (or was served from cache) and produced output.
    Completed { output: String, cached: bool },
    /// The gate decided this content is never processed.
    Skipped { reason: GateReason },
    /// The gate wants the user asked before processing.
    NeedsPrompt { reason: GateReason },
    /// The gate deferred to a later explicit trigger.
    Deferred { reason: GateReason },
}

impl RequestOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Skipped { .. } => "skipped",
            Self::NeedsPrompt { .. } => "needs_prompt",
            Self::Deferred { .. } => "deferred",
        }
    }
}

/// Notification emitted by the orchestrator on a broadcast channel.
///
/// Fire-and-forget: the orchestrator sends regardless of whether anyone
/// is subscribed. UI layers pick the transport; the core only emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    Started {
        source: String,
        category: OperationCategory,
    },
    Completed {
        source: String,
        category: OperationCategory,
        cached: bool,
    },
    Skipped {
        source: String,
        reason: GateReason,
    },
    PromptNeeded {
        source: String,
        reason: GateReason,
    },
    Deferred {
        source: String,
        reason: GateReason,
    },
    Failed {
        source: String,
        category: OperationCategory,
        error: String,
    },
}
