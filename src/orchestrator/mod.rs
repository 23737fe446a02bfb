//! Request orchestration — gate, admit, then execute with fallback.

pub mod processor;
pub mod types;

pub use processor::{Orchestrator, OrchestratorDeps};
pub use types::{
    ExtractedDocument, InferenceClient, InferenceRequest, OrchestratorEvent, PolicyStore,
    RequestOutcome, ResultCache, SignalExtractor,
};
