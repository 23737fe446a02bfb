//! Configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::admission::OperationCategory;

/// Per-category concurrency ceilings for the admission controller.
///
/// Summarization is heavier per call (long prompts, long completions), so
/// it gets a tighter ceiling than queries and indexing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConcurrencyLimits {
    /// Interactive queries (questions, word lookups).
    pub query: usize,
    /// Content indexing.
    pub indexing: usize,
    /// Content summarization.
    pub summarization: usize,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            query: 3,
            indexing: 3,
            summarization: 2,
        }
    }
}

impl ConcurrencyLimits {
    /// Ceiling for the given category.
    pub fn ceiling(&self, category: OperationCategory) -> usize {
        match category {
            OperationCategory::Query => self.query,
            OperationCategory::Indexing => self.indexing,
            OperationCategory::Summarization => self.summarization,
        }
    }
}

/// Timeouts for individual capability invocations.
///
/// A timeout is an ordinary single-candidate failure — the fallback
/// executor absorbs it and moves on to the next candidate.
#[derive(Debug, Clone, Copy)]
pub struct InferenceTimeouts {
    /// Timeout for a normal-sized request.
    pub request: Duration,
    /// Timeout for a request whose payload exceeds `long_payload_chars`.
    pub long_request: Duration,
    /// Payload size (in characters) above which the long timeout applies.
    pub long_payload_chars: usize,
}

impl Default for InferenceTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            long_request: Duration::from_secs(120),
            long_payload_chars: 24_000,
        }
    }
}

impl InferenceTimeouts {
    /// Pick the timeout for a payload of the given size.
    pub fn for_payload(&self, payload_chars: usize) -> Duration {
        if payload_chars > self.long_payload_chars {
            self.long_request
        } else {
            self.request
        }
    }
}

/// Processing mode for content-triggered work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Never process automatically — wait for an explicit user trigger.
    Manual,
    /// Process confidently-readable content without asking.
    Automatic,
    /// Process high-confidence content, prompt the user on medium confidence.
    Assisted,
}

/// User policy for the classification gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Processing mode.
    pub mode: PolicyMode,
    /// Sources to always process (case-insensitive substring match).
    pub allowlist: Vec<String>,
    /// Sources to never process (case-insensitive substring match).
    pub denylist: Vec<String>,
    /// Minimum word count for unassisted automatic processing.
    pub auto_min_words: usize,
    /// Minimum word count for the assisted prompt (and for allowlist hits,
    /// which use this lower bar — an allowlist entry is a stronger trust
    /// signal than unassisted heuristics).
    pub prompt_min_words: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            mode: PolicyMode::Assisted,
            allowlist: Vec::new(),
            denylist: Vec::new(),
            auto_min_words: 300,
            prompt_min_words: 120,
        }
    }
}

impl PolicyConfig {
    /// Whether the source locator matches the allowlist.
    pub fn allows(&self, source: &str) -> bool {
        Self::matches(&self.allowlist, source)
    }

    /// Whether the source locator matches the denylist.
    pub fn denies(&self, source: &str) -> bool {
        Self::matches(&self.denylist, source)
    }

    fn matches(patterns: &[String], source: &str) -> bool {
        let source = source.to_lowercase();
        patterns
            .iter()
            .any(|p| !p.is_empty() && source.contains(&p.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ceilings() {
        let limits = ConcurrencyLimits::default();
        assert_eq!(limits.ceiling(OperationCategory::Query), 3);
        assert_eq!(limits.ceiling(OperationCategory::Indexing), 3);
        assert_eq!(limits.ceiling(OperationCategory::Summarization), 2);
    }

    #[test]
    fn long_payload_gets_long_timeout() {
        let timeouts = InferenceTimeouts::default();
        assert_eq!(timeouts.for_payload(100), timeouts.request);
        assert_eq!(timeouts.for_payload(30_000), timeouts.long_request);
    }

    #[test]
    fn list_matching_is_case_insensitive_substring() {
        let policy = PolicyConfig {
            denylist: vec!["Bank.example".into()],
            allowlist: vec!["docs.rs".into()],
            ..Default::default()
        };
        assert!(policy.denies("https://bank.example.com/account"));
        assert!(!policy.denies("https://news.example.com"));
        assert!(policy.allows("https://docs.rs/tokio"));
    }

    #[test]
    fn empty_pattern_never_matches() {
        let policy = PolicyConfig {
            denylist: vec![String::new()],
            ..Default::default()
        };
        assert!(!policy.denies("https://anything.example"));
    }
}
