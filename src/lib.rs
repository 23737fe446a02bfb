//! Doc Assist core — request orchestration for a client-side AI assistant.
//!
//! Decides whether fetched content should be processed at all
//! ([`gate`]), admits work under bounded per-category concurrency with
//! single-flight deduplication ([`admission`]), and executes admitted work
//! across interchangeable inference backends with automatic fallback
//! ([`capability`]). [`orchestrator`] composes the three per request.
//!
//! Single process, in-memory only: no cross-process scheduling and no
//! persistence of queued work.

pub mod admission;
pub mod capability;
pub mod config;
pub mod error;
pub mod gate;
pub mod orchestrator;
