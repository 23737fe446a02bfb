//! Candidate ranking — a declarative priority table per task kind plus a
//! pure ordering function, independent of any network code.

use serde::{Deserialize, Serialize};

/// Identifier of an inference capability (a model on some backend).
pub type CapabilityId = String;

/// Kind of inference work, used to pick a candidate ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Define a word or phrase from the document.
    WordLookup,
    /// Answer a question about the document.
    Question,
    /// Summarize the document.
    Summarization,
    /// Index document content.
    Indexing,
}

impl TaskKind {
    /// Short label for logging and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::WordLookup => "word_lookup",
            Self::Question => "question",
            Self::Summarization => "summarization",
            Self::Indexing => "indexing",
        }
    }

    /// Ordered id-substring hints for this task.
    ///
    /// Short-latency tasks prefer small, fast capabilities; long-context
    /// tasks prefer higher-capacity ones. Every available capability is
    /// still eventually tried — hints only order the list.
    pub fn priority_hints(&self) -> &'static [&'static str] {
        match self {
            Self::WordLookup => &["small", "mini", "3b", "7b"],
            Self::Question => &["instruct", "13b", "7b"],
            Self::Summarization => &["large", "70b", "32b", "13b"],
            Self::Indexing => &["embed", "small", "7b"],
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Build the ordered, de-duplicated candidate list for a task.
///
/// A user pin, when set, is the sole candidate. Otherwise each hint (in
/// order) claims the first available capability whose id contains it, and
/// all remaining available capabilities are appended in their original
/// order.
pub fn rank_candidates(
    task: TaskKind,
    available: &[CapabilityId],
    pinned: Option<&str>,
) -> Vec<CapabilityId> {
    if let Some(pin) = pinned {
        return vec![pin.to_string()];
    }

    let mut ranked: Vec<CapabilityId> = Vec::with_capacity(available.len());
    for hint in task.priority_hints() {
        if let Some(id) = available
            .iter()
            .find(|id| id.contains(hint) && !ranked.contains(id))
        {
            ranked.push(id.clone());
        }
    }
    for id in available {
        if !ranked.contains(id) {
            ranked.push(id.clone());
        }
    }
    ranked
}
